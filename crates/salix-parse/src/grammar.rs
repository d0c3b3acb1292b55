//! A statement-level grammar with error recovery.
//!
//! Statements are parsed as flat runs of leaves; compound statements own
//! their clause headers and either an indented `SUITE` or an inline simple
//! statement. Anything that does not fit becomes an `ERROR_NODE` or
//! `ERROR_LEAF` without ever dropping input, so serializing the tree always
//! reproduces the source.

use salix_tokenizer::Token;
use salix_tree::NodeId;
use salix_tree::SyntaxKind::{self, *};

use crate::parser::Parser;

/// Parses statements into `module` until the end marker, then attaches the
/// end marker leaf itself.
pub(crate) fn file(p: &mut Parser<'_, '_>, module: NodeId) {
    loop {
        if p.peek().kind == ENDMARKER {
            break;
        }
        let stmt = statement(p);
        p.tree.push_child(module, stmt);
    }
    let end = p.bump();
    let leaf = p.leaf(end);
    p.tree.push_child(module, leaf);
}

/// Keywords that open a compound statement, mapped to its node kind.
fn compound_kind(keyword: &str) -> Option<SyntaxKind> {
    Some(match keyword {
        "if" => IF_STMT,
        "while" => WHILE_STMT,
        "for" => FOR_STMT,
        "try" => TRY_STMT,
        "with" => WITH_STMT,
        "def" => FUNCDEF,
        "class" => CLASSDEF,
        _ => return None,
    })
}

fn statement(p: &mut Parser<'_, '_>) -> NodeId {
    match p.peek().kind {
        NAME => {
            if let Some(kind) = compound_kind(&p.peek().text) {
                compound(p, kind)
            } else if matches!(p.peek().text.as_str(), "elif" | "else" | "except" | "finally") {
                orphan_clause(p)
            } else {
                simple_stmt(p)
            }
        }
        INDENT | DEDENT | ERROR_DEDENT | NEWLINE => {
            // A token no statement can start with; preserved as an error
            // leaf so the line still round-trips.
            let token = p.bump();
            p.error_leaf(token)
        }
        _ => simple_stmt(p),
    }
}

/// A flat run of leaves up to and including the closing newline. A run
/// containing bad tokens or left with an open bracket is an `ERROR_NODE`.
fn simple_stmt(p: &mut Parser<'_, '_>) -> NodeId {
    let mut children = Vec::new();
    let mut has_error = false;
    let mut depth = 0_i32;
    loop {
        match p.peek().kind {
            NEWLINE => {
                let token = p.bump();
                children.push(p.leaf(token));
                break;
            }
            ENDMARKER | INDENT | DEDENT | ERROR_DEDENT => break,
            ERRORTOKEN => {
                has_error = true;
                let token = p.bump();
                children.push(p.leaf(token));
            }
            kind => {
                if kind == OP {
                    match p.peek().text.as_str() {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth -= 1,
                        _ => {}
                    }
                }
                let token = p.bump();
                children.push(p.leaf(token));
            }
        }
    }
    let kind = if has_error || depth > 0 { ERROR_NODE } else { SIMPLE_STMT };
    let node = p.tree.alloc_node(kind);
    p.tree.set_children(node, children);
    node
}

fn compound(p: &mut Parser<'_, '_>, kind: SyntaxKind) -> NodeId {
    let is_flow = kind.is_flow();
    if is_flow {
        p.begin_flow();
    }

    let mut children = Vec::new();
    let mut ok = clause(p, &mut children);
    if ok {
        match kind {
            IF_STMT => {
                while ok && at_keyword(p, "elif") {
                    ok = clause(p, &mut children);
                }
                if ok && at_keyword(p, "else") {
                    ok = clause(p, &mut children);
                }
            }
            WHILE_STMT | FOR_STMT => {
                if at_keyword(p, "else") {
                    ok = clause(p, &mut children);
                }
            }
            TRY_STMT => {
                while ok && at_keyword(p, "except") {
                    ok = clause(p, &mut children);
                }
                if ok && at_keyword(p, "else") {
                    ok = clause(p, &mut children);
                }
                if ok && at_keyword(p, "finally") {
                    ok = clause(p, &mut children);
                }
            }
            _ => {}
        }
    }

    if is_flow {
        p.end_flow();
    }
    let node = p.tree.alloc_node(if ok { kind } else { ERROR_NODE });
    p.tree.set_children(node, children);
    node
}

/// A clause keyword at statement level with nothing to attach to, e.g. an
/// `else:` whose `if` was deleted. Parsed like any clause, kept as an error.
fn orphan_clause(p: &mut Parser<'_, '_>) -> NodeId {
    let mut children = Vec::new();
    let _ = clause(p, &mut children);
    let node = p.tree.alloc_node(ERROR_NODE);
    p.tree.set_children(node, children);
    node
}

fn at_keyword(p: &mut Parser<'_, '_>, keyword: &str) -> bool {
    p.peek().kind == NAME && p.peek().text == keyword
}

/// One `header: body` clause. Header leaves and the body are appended to
/// `children`; returns whether the clause was well-formed.
fn clause(p: &mut Parser<'_, '_>, children: &mut Vec<NodeId>) -> bool {
    // Header, up to and including the colon.
    loop {
        let kind = p.peek().kind;
        if kind == OP && p.peek().text == ":" {
            let token = p.bump();
            children.push(p.leaf(token));
            break;
        }
        match kind {
            NEWLINE => {
                let token = p.bump();
                children.push(p.leaf(token));
                return false;
            }
            ENDMARKER | INDENT | DEDENT | ERROR_DEDENT => return false,
            _ => {
                let token = p.bump();
                children.push(p.leaf(token));
            }
        }
    }

    // Body: an indented suite or an inline simple statement.
    match p.peek().kind {
        NEWLINE => {
            let newline = p.bump();
            if p.peek().kind == INDENT {
                p.bump();
                children.push(suite(p, newline));
                true
            } else {
                children.push(p.leaf(newline));
                false
            }
        }
        ENDMARKER => false,
        _ => {
            children.push(simple_stmt(p));
            true
        }
    }
}

/// The indented statements after a clause header. The leading newline and
/// every statement live inside the `SUITE` node; the INDENT/DEDENT pair
/// that frames it carries no text and is dropped.
fn suite(p: &mut Parser<'_, '_>, newline: Token) -> NodeId {
    let node = p.tree.alloc_node(SUITE);
    let mut children = vec![p.leaf(newline)];
    p.begin_suite();
    // Unexpected deeper indents inside the suite are kept as error leaves;
    // their matching dedents must not close the suite itself.
    let mut extra_indents = 0_u32;
    loop {
        match p.peek().kind {
            DEDENT => {
                let token = p.bump();
                if extra_indents > 0 {
                    extra_indents -= 1;
                    children.push(p.error_leaf(token));
                } else {
                    break;
                }
            }
            INDENT => {
                extra_indents += 1;
                let token = p.bump();
                children.push(p.error_leaf(token));
            }
            ERROR_DEDENT => {
                let token = p.bump();
                children.push(p.error_leaf(token));
            }
            ENDMARKER => break,
            _ => {
                let stmt = statement(p);
                children.push(stmt);
                p.count_suite_stmt();
            }
        }
    }
    p.end_suite();
    p.tree.set_children(node, children);
    node
}
