//! Incremental re-parsing driven by a line diff.
//!
//! An update never mutates the old tree. The line diff between the old and
//! new text is walked opcode by opcode: for equal ranges, whole statements
//! are deep-copied out of the old tree (their line numbers patched at the
//! end), and everything else is re-parsed in small fenced chunks. Copies and
//! freshly parsed statements are collected in a stack of open scopes and
//! stitched into the final tree when the update closes.
//!
//! Copying follows strict admissibility rules; whenever one fails the
//! affected lines fall back to a fresh parse, so the result is always
//! byte-for-byte the new text.

use rustc_hash::FxHashMap;
use salix_tokenizer::Tokenizer;
use salix_tree::SyntaxKind::*;
use salix_tree::{NodeId, Position, Tree, split_lines};
use similar::{Algorithm, DiffTag, capture_diff_slices};
use thiserror::Error;
use tracing::debug;

use crate::parser::{Fence, ParsedChunk, Parser};

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum DiffError {
    /// Neither copying nor parsing advanced past `line`; the old tree and
    /// the line diff disagree about the document.
    #[error("incremental update made no progress at line {line}")]
    NoProgress { line: u32 },
    /// The finished tree does not reproduce the new text.
    #[error("incremental update out of sync: {detail}")]
    OutOfSync { detail: String },
}

/// Re-parses a new version of a document against the tree of the old one.
pub struct DiffParser<'a> {
    old: &'a Tree,
    pub(crate) copy_count: usize,
    pub(crate) parse_count: usize,
}

impl<'a> DiffParser<'a> {
    pub fn new(old: &'a Tree) -> Self {
        Self { old, copy_count: 0, parse_count: 0 }
    }

    /// Builds the tree for `new_lines`, reusing statements of the old tree
    /// wherever the line diff allows. Both arguments must be the documents
    /// split with [`split_lines`] keeping the line terminators.
    pub fn update(&mut self, old_lines: &[String], new_lines: &[String]) -> Result<Tree, DiffError> {
        self.copy_count = 0;
        self.parse_count = 0;
        let line_length = new_lines.len() as u32;
        let mut nodes = NodesTree::new();

        let ops = capture_diff_slices(Algorithm::Myers, old_lines, new_lines);
        for op in &ops {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            let (i1, i2) = (old_range.start as u32, old_range.end as u32);
            let (j1, mut j2) = (new_range.start as u32, new_range.end as u32);
            if j2 == line_length && new_lines.last().is_some_and(|line| line.is_empty()) {
                // The artificial empty line after the last terminator never
                // needs parsing on its own.
                j2 -= 1;
            }
            debug!(?tag, i1, i2, j1, j2, "diff opcode");
            match tag {
                DiffTag::Equal => {
                    let line_offset = j1 as i64 - i1 as i64;
                    self.copy_from_old(&mut nodes, line_offset, i1 + 1, i2, j2, new_lines)?;
                }
                DiffTag::Replace | DiffTag::Insert => {
                    self.parse_until(&mut nodes, j2, new_lines)?;
                }
                DiffTag::Delete => {}
            }
        }

        let tree = nodes.close();
        let last_line = tree.end_position(tree.root()).line;
        if last_line != line_length {
            return Err(DiffError::OutOfSync {
                detail: format!("tree ends at line {last_line}, the text at line {line_length}"),
            });
        }
        if cfg!(debug_assertions) && tree.text() != new_lines.concat() {
            return Err(DiffError::OutOfSync {
                detail: "re-serialized tree differs from the new text".into(),
            });
        }
        Ok(tree)
    }

    /// Copies statements for one equal opcode until the new side of the
    /// range is covered, falling back to 1-line parses where no statement
    /// of the old tree lines up.
    fn copy_from_old(
        &mut self,
        nodes: &mut NodesTree,
        line_offset: i64,
        start_line_old: u32,
        until_line_old: u32,
        until_line_new: u32,
        new_lines: &[String],
    ) -> Result<(), DiffError> {
        let mut last_until_line = -1_i64;
        while until_line_new > nodes.parsed_until_line() {
            let parsed_until_line_old =
                (nodes.parsed_until_line() as i64 - line_offset).max(0) as u32;
            match self.old_line_statement(parsed_until_line_old + 1) {
                None => self.parse_until(nodes, nodes.parsed_until_line() + 1, new_lines)?,
                Some(stmt) => {
                    let copied = if start_line_old == 1 && self.old_starts_with_bom() {
                        // Lines around a byte order mark shift by its width;
                        // re-parse instead of patching columns.
                        Vec::new()
                    } else {
                        let parent = self.old.parent(stmt).unwrap_or(self.old.root());
                        let siblings = self.old.children(parent);
                        let index =
                            siblings.iter().position(|&c| c == stmt).unwrap_or(siblings.len());
                        nodes.copy_nodes(
                            self.old,
                            &siblings[index..],
                            until_line_old,
                            line_offset,
                        )
                    };
                    if copied.is_empty() {
                        self.parse_until(nodes, nodes.parsed_until_line() + 1, new_lines)?;
                    } else {
                        self.copy_count += 1;
                        debug!(
                            count = copied.len(),
                            until = nodes.parsed_until_line(),
                            "copied statements"
                        );
                    }
                }
            }
            if last_until_line == nodes.parsed_until_line() as i64 {
                return Err(DiffError::NoProgress { line: nodes.parsed_until_line() + 1 });
            }
            last_until_line = nodes.parsed_until_line() as i64;
        }
        Ok(())
    }

    fn old_starts_with_bom(&self) -> bool {
        let first = self.old.first_leaf(self.old.root());
        self.old.is_leaf(first) && self.old.leaf_prefix(first).starts_with(BOM)
    }

    /// The statement of the old tree that starts exactly at `old_line`, if
    /// its parent is the module or a suite.
    fn old_line_statement(&self, old_line: u32) -> Option<NodeId> {
        let mut leaf = self.old.leaf_for_position(Position::new(old_line, 0), true)?;
        if ends_with_newline(self.old, leaf, "") {
            leaf = self.old.next_leaf(leaf)?;
        }
        if prefix_start_line(self.old, leaf) != old_line {
            return None;
        }
        let mut node = leaf;
        loop {
            let parent = self.old.parent(node)?;
            if matches!(self.old.kind(parent), MODULE | SUITE) {
                break;
            }
            node = parent;
        }
        // A statement that started on an earlier line is of no use; copying
        // must begin at a statement boundary.
        (self.old.start_position(node).line >= old_line).then_some(node)
    }

    /// Parses fenced chunks until `until_line` is covered.
    fn parse_until(
        &mut self,
        nodes: &mut NodesTree,
        until_line: u32,
        new_lines: &[String],
    ) -> Result<(), DiffError> {
        let mut last_until_line = 0;
        while until_line > nodes.parsed_until_line() {
            let chunk = self.parse_chunk(nodes, until_line, new_lines);
            let stmts = nodes.tree.children(chunk.module).to_vec();
            nodes.indents = chunk.indents;
            nodes.add_parsed_nodes(stmts, &chunk.keyword_indents);
            if let Some(indent) = chunk.replace_tos_indent
                && let Some(top) = nodes.indents.last_mut()
            {
                *top = indent;
            }
            debug!(until = nodes.parsed_until_line(), "parsed chunk");
            if last_until_line == nodes.parsed_until_line() {
                return Err(DiffError::NoProgress { line: until_line });
            }
            last_until_line = nodes.parsed_until_line();
        }
        Ok(())
    }

    fn parse_chunk(
        &mut self,
        nodes: &mut NodesTree,
        until_line: u32,
        new_lines: &[String],
    ) -> ParsedChunk {
        self.parse_count += 1;
        let parsed_until_line = nodes.parsed_until_line();
        let lines_after = &new_lines[parsed_until_line as usize..];
        let tokenizer = Tokenizer::new(
            lines_after,
            parsed_until_line + 1,
            nodes.indents.clone(),
            parsed_until_line == 0,
        );
        let fence = Fence { until_line, initial_indents: nodes.indents.len() };
        Parser::new(&mut nodes.tree, tokenizer, Some(fence)).parse_chunk()
    }
}

/// One run of statements placed under an open scope, together with the
/// prefix that precedes it and the line patch to apply at the end.
struct ChildrenGroup {
    prefix: String,
    children: Vec<NodeId>,
    line_offset: i64,
    /// Positions are patched up to and including this leaf; anything after
    /// it belongs to a still-open nested scope with its own groups.
    last_line_offset_leaf: NodeId,
}

/// An open scope of the tree being built: the module, or a suite whose
/// statements are still being collected.
struct WorkingNode {
    tree_node: NodeId,
    /// Indentation of the header owning this scope, used to decide how far
    /// the stack pops when new content arrives.
    indentation: u32,
    groups: Vec<ChildrenGroup>,
    node_children: Vec<usize>,
}

/// Collects copied and parsed statements and stitches them into a tree.
struct NodesTree {
    tree: Tree,
    nodes: Vec<WorkingNode>,
    working_stack: Vec<usize>,
    prefix: String,
    /// Partial last line split off an end marker prefix; re-attached to the
    /// final end marker so no byte is lost.
    prefix_remainder: String,
    indents: Vec<u32>,
}

impl NodesTree {
    fn new() -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Self {
            tree,
            nodes: vec![WorkingNode {
                tree_node: root,
                indentation: 0,
                groups: Vec::new(),
                node_children: Vec::new(),
            }],
            working_stack: vec![0],
            prefix: String::new(),
            prefix_remainder: String::new(),
            indents: vec![0],
        }
    }

    fn tos(&self) -> usize {
        self.working_stack.last().copied().unwrap_or(0)
    }

    /// The last new-document line that is fully covered so far.
    fn parsed_until_line(&self) -> u32 {
        self.last_line_of(self.tos(), &self.prefix)
    }

    fn last_line_of(&self, index: usize, suffix: &str) -> u32 {
        let node = &self.nodes[index];
        let mut line = 0_i64;
        if let Some(group) = node.groups.last() {
            let last_leaf = skip_dedent_error_leaves(&self.tree, group.last_line_offset_leaf);
            line = self.tree.end_position(last_leaf).line as i64 + group.line_offset;
            if ends_with_newline(&self.tree, last_leaf, suffix) {
                line -= 1;
            }
        }
        line += split_lines(suffix, false).len() as i64 - 1;
        if !suffix.is_empty() && !suffix.ends_with(['\n', '\r']) {
            line += 1;
        }
        if let Some(&child) = node.node_children.last() {
            line = line.max(self.last_line_of(child, suffix) as i64);
        }
        line.max(0) as u32
    }

    /// Pops scopes that the given indentation no longer fits into.
    fn update_insertion_node(&mut self, indentation: u32) {
        while self.working_stack.len() > 1 && self.nodes[self.tos()].indentation >= indentation {
            self.working_stack.pop();
        }
    }

    /// Places the statements of a freshly parsed chunk, re-opening the suite
    /// scope of a trailing `def`/`class` so later content can join it.
    fn add_parsed_nodes(
        &mut self,
        children: Vec<NodeId>,
        keyword_indents: &FxHashMap<Position, Vec<u32>>,
    ) {
        let old_prefix = std::mem::take(&mut self.prefix);
        let stmts = self.remove_endmarker(children);
        let Some(&last) = stmts.last() else {
            self.prefix = format!("{old_prefix}{}", self.prefix);
            return;
        };

        let indentation = self.tree.indentation(stmts[0]);
        self.update_insertion_node(indentation);
        let last_leaf = self.tree.last_leaf(last);
        let tos = self.tos();
        self.nodes[tos].groups.push(ChildrenGroup {
            prefix: old_prefix,
            children: stmts,
            line_offset: 0,
            last_line_offset_leaf: last_leaf,
        });
        self.update_parsed_tos(last, keyword_indents);
    }

    /// Walks down trailing `def`/`class` statements, pushing an open scope
    /// for each suite so the next chunk may continue inside it.
    fn update_parsed_tos(
        &mut self,
        tree_node: NodeId,
        keyword_indents: &FxHashMap<Position, Vec<u32>>,
    ) {
        if self.tree.kind(tree_node) == SUITE {
            let parent = self.tree.parent(tree_node);
            let keyword_leaf = parent.and_then(|p| self.tree.children(p).first().copied());
            let indentation = keyword_leaf
                .and_then(|leaf| keyword_indents.get(&self.tree.position(leaf)))
                .and_then(|stack| stack.last().copied())
                .unwrap_or_else(|| parent.map_or(0, |p| self.tree.indentation(p)));

            let suite_children = self.tree.children(tree_node).to_vec();
            let last_child = suite_children.last().copied();
            let group = last_child.map(|child| ChildrenGroup {
                prefix: String::new(),
                children: suite_children,
                line_offset: 0,
                last_line_offset_leaf: self.tree.last_leaf(child),
            });
            let index = self.nodes.len();
            self.nodes.push(WorkingNode {
                tree_node,
                indentation,
                groups: group.into_iter().collect(),
                node_children: Vec::new(),
            });
            let tos = self.tos();
            self.nodes[tos].node_children.push(index);
            self.working_stack.push(index);
            if let Some(child) = last_child {
                self.update_parsed_tos(child, keyword_indents);
            }
        } else if func_or_class_has_suite(&self.tree, tree_node) {
            if let Some(&suite) = self.tree.children(tree_node).last() {
                self.update_parsed_tos(suite, keyword_indents);
            }
        }
    }

    /// Drops the chunk's end marker, keeping its prefix as pending material
    /// for whatever comes next. A partial last line in that prefix is held
    /// back separately: it has not been fully covered yet.
    fn remove_endmarker(&mut self, mut stmts: Vec<NodeId>) -> Vec<NodeId> {
        self.prefix_remainder.clear();
        self.prefix.clear();
        let Some(&last) = stmts.last() else {
            return stmts;
        };
        let last_leaf = self.tree.last_leaf(last);
        if self.tree.kind(last_leaf) == ENDMARKER {
            let prefix = self.tree.leaf_prefix(last_leaf).to_string();
            if let Some(index) = prefix.rfind(['\n', '\r']) {
                let (keep, rest) = prefix.split_at(index + 1);
                self.prefix_remainder = rest.to_string();
                self.prefix = keep.to_string();
                self.tree.set_leaf_prefix(last_leaf, keep.to_string());
            } else {
                self.prefix = prefix;
            }
            stmts.pop();
        }
        stmts
    }

    /// Copies as many of `old_nodes` as the admissibility rules allow into
    /// the tree being built, keeping their old line numbers until `close`.
    /// Returns the copies; empty means nothing could be reused.
    fn copy_nodes(
        &mut self,
        old: &Tree,
        old_nodes: &[NodeId],
        until_line: u32,
        line_offset: i64,
    ) -> Vec<NodeId> {
        let Some(&first) = old_nodes.first() else {
            return Vec::new();
        };
        if old.kind(first).is_error() {
            // Never reuse previously broken statements; they may parse
            // differently in their new surroundings.
            return Vec::new();
        }

        let indentation = old.indentation(first);
        let saved_stack = self.working_stack.clone();
        let saved_prefix = self.prefix.clone();
        let saved_indents = self.indents.clone();
        self.indents.retain(|&indent| indent <= indentation);
        self.update_insertion_node(indentation);

        let stack = self.working_stack.clone();
        let prefix = self.prefix.clone();
        let (copied, new_stack, new_prefix, added_indents) =
            self.copy_nodes_inner(stack, old, old_nodes, until_line, line_offset, prefix, false);

        if copied.is_empty() {
            self.working_stack = saved_stack;
            self.prefix = saved_prefix;
            self.indents = saved_indents;
        } else {
            self.working_stack = new_stack;
            self.prefix = new_prefix;
            self.indents.extend(added_indents);
        }
        copied
    }

    fn copy_nodes_inner(
        &mut self,
        working_stack: Vec<usize>,
        old: &Tree,
        old_nodes: &[NodeId],
        until_line: u32,
        line_offset: i64,
        prefix: String,
        is_nested: bool,
    ) -> (Vec<NodeId>, Vec<usize>, String, Vec<u32>) {
        let mut added_indents = Vec::new();
        let candidates = self.matching_indent_nodes(old, old_nodes, is_nested);
        let mut selected: Vec<NodeId> = Vec::new();
        let mut new_prefix = String::new();

        for &node in &candidates {
            if old.start_position(node).line > until_line {
                break;
            }
            if old.kind(node) == ENDMARKER {
                break;
            }
            if old.kind(node) == ERROR_LEAF
                && matches!(old.token_kind(node), DEDENT | ERROR_DEDENT)
            {
                break;
            }
            if last_line(old, node) > until_line {
                // A statement crossing the boundary can only be taken along
                // when it is a def/class whose suite we may split.
                if func_or_class_has_suite(old, node) {
                    selected.push(node);
                }
                break;
            }
            if !old.is_leaf(node) {
                if let Some(&body) = old.children(node).last() {
                    if old.kind(body).is_error() {
                        break;
                    }
                }
            }
            selected.push(node);
        }

        // The tail must not end in anything that could still change meaning
        // when the following lines differ: error nodes, or flow statements
        // that a later clause could attach to. Cut back to a newline
        // boundary.
        loop {
            let Some(&last) = selected.last() else { break };
            if old.kind(last).is_error() || is_flow_statement(old, last) {
                new_prefix.clear();
                selected.pop();
                while let Some(&previous) = selected.last() {
                    if old.kind(old.last_leaf(previous)) == NEWLINE {
                        break;
                    }
                    selected.pop();
                }
                continue;
            }
            if selected.len() > 1 && old.kind(selected[selected.len() - 2]) == ERROR_NODE {
                selected.pop();
                continue;
            }
            break;
        }

        if selected.is_empty() {
            return (Vec::new(), working_stack, prefix, added_indents);
        }

        let tos = working_stack[working_stack.len() - 1];
        let last_node = selected[selected.len() - 1];
        let mut new_stack = working_stack.clone();
        let mut had_valid_suite_last = false;
        let mut split_suite = None;

        if func_or_class_has_suite(old, last_node) {
            // Split: take the header now, recurse into the suite so it may
            // be copied partially and stays open for later content.
            if let Some(&old_suite) = old.children(last_node).last() {
                if let Some(&body_first) = old.children(old_suite).get(1) {
                    added_indents.push(old.indentation(body_first));
                }
                let new_suite = self.tree.alloc_node(SUITE);
                let suite_tos = self.nodes.len();
                self.nodes.push(WorkingNode {
                    tree_node: new_suite,
                    indentation: old.indentation(last_node),
                    groups: Vec::new(),
                    node_children: Vec::new(),
                });
                let mut suite_stack = new_stack.clone();
                suite_stack.push(suite_tos);
                let suite_children = old.children(old_suite).to_vec();
                let (suite_nodes, suite_stack, suite_prefix, inner_indents) = self
                    .copy_nodes_inner(
                        suite_stack,
                        old,
                        &suite_children,
                        until_line,
                        line_offset,
                        String::new(),
                        true,
                    );
                added_indents.extend(inner_indents);
                if suite_nodes.len() < 2 {
                    // A suite holding only its newline is not valid.
                    selected.pop();
                    new_prefix.clear();
                } else {
                    self.nodes[tos].node_children.push(suite_tos);
                    new_stack = suite_stack;
                    new_prefix = suite_prefix;
                    had_valid_suite_last = true;
                    split_suite = Some(new_suite);
                }
            }
        }

        if selected.is_empty() {
            return (Vec::new(), working_stack, prefix, added_indents);
        }

        if !had_valid_suite_last {
            let last_leaf = old.last_leaf(selected[selected.len() - 1]);
            if !ends_with_newline(old, last_leaf, "") {
                // The next line starts in the following leaf's prefix; its
                // first physical line is still part of the copied range.
                new_prefix = old
                    .next_leaf(last_leaf)
                    .map(|next| {
                        split_lines(old.leaf_prefix(next), true)
                            .first()
                            .copied()
                            .unwrap_or_default()
                            .to_string()
                    })
                    .unwrap_or_default();
            }
        }

        let mut copied = Vec::with_capacity(selected.len());
        for (index, &node) in selected.iter().enumerate() {
            if index + 1 == selected.len()
                && let Some(new_suite) = split_suite
            {
                copied.push(self.copy_split_header(old, node, new_suite));
            } else {
                copied.push(self.tree.copy_subtree(old, node));
            }
        }

        let last_copied = copied[copied.len() - 1];
        let last_line_offset_leaf = if had_valid_suite_last {
            // Patch positions only up to the header colon; the suite's
            // content belongs to the still-open scope.
            let children = self.tree.children(last_copied);
            let colon = children[children.len() - 2];
            debug_assert_eq!(self.tree.leaf_text(self.tree.last_leaf(colon)), ":");
            self.tree.last_leaf(colon)
        } else {
            self.tree.last_leaf(last_copied)
        };
        self.nodes[tos].groups.push(ChildrenGroup {
            prefix,
            children: copied.clone(),
            line_offset,
            last_line_offset_leaf,
        });
        self.prefix_remainder.clear();

        (copied, new_stack, new_prefix, added_indents)
    }

    /// Copies a def/class header, attaching the still-open suite node in
    /// place of the old suite.
    fn copy_split_header(&mut self, old: &Tree, node: NodeId, new_suite: NodeId) -> NodeId {
        let id = self.tree.alloc_node(old.kind(node));
        let old_children = old.children(node);
        let mut children: Vec<NodeId> = old_children[..old_children.len() - 1]
            .iter()
            .map(|&child| self.tree.copy_subtree(old, child))
            .collect();
        children.push(new_suite);
        self.tree.set_children(id, children);
        id
    }

    /// The leading run of `old_nodes` sharing one indentation. Outside a
    /// suite split that indentation must also still be an open scope of the
    /// new document, otherwise nothing is reusable here.
    fn matching_indent_nodes(
        &self,
        old: &Tree,
        old_nodes: &[NodeId],
        is_nested: bool,
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut iter = old_nodes.iter().copied();
        if is_nested {
            match iter.next() {
                // The newline opening the suite.
                Some(newline) => out.push(newline),
                None => return out,
            }
        }
        let Some(first) = iter.next() else {
            return out;
        };
        let indentation = old.indentation(first);
        if !is_nested && !self.indents.contains(&indentation) {
            return Vec::new();
        }
        out.push(first);
        for node in iter {
            if old.indentation(node) != indentation {
                break;
            }
            out.push(node);
        }
        out
    }

    /// Attaches all collected groups to their scopes, patches copied line
    /// numbers and appends the final end marker.
    fn close(mut self) -> Tree {
        self.finish_node(0);

        let root = self.tree.root();
        let mut end_pos = if self.tree.children(root).is_empty() {
            Position::new(1, 0)
        } else {
            let leaf = skip_dedent_error_leaves(&self.tree, self.tree.last_leaf(root));
            self.tree.end_position(leaf)
        };

        let lines = split_lines(&self.prefix, false);
        if lines.len() == 1 {
            let first = lines[0];
            let mut width = first.len() as u32;
            if first.starts_with(BOM) && end_pos == Position::new(1, 0) {
                width -= BOM.len_utf8() as u32;
            }
            end_pos.column += width;
        } else {
            end_pos.line += lines.len() as u32 - 1;
            end_pos.column = lines[lines.len() - 1].len() as u32;
        }

        let prefix = format!("{}{}", self.prefix, self.prefix_remainder);
        let endmarker = self.tree.alloc_leaf(ENDMARKER, String::new(), prefix, end_pos);
        self.tree.push_child(root, endmarker);
        self.tree
    }

    fn finish_node(&mut self, index: usize) {
        let groups = std::mem::take(&mut self.nodes[index].groups);
        let tree_node = self.nodes[index].tree_node;
        let mut children = Vec::new();
        for group in groups {
            let mut first_leaf = self.tree.first_leaf(group.children[0]);
            while self.tree.is_indentation_error_leaf(first_leaf) {
                match self.tree.next_leaf(first_leaf) {
                    Some(next) => first_leaf = next,
                    None => break,
                }
            }
            self.tree.prepend_leaf_prefix(first_leaf, &group.prefix);
            if group.line_offset != 0 {
                self.tree.shift_lines(
                    &group.children,
                    group.line_offset as i32,
                    group.last_line_offset_leaf,
                );
            }
            children.extend(group.children);
        }
        self.tree.set_children(tree_node, children);

        let node_children = std::mem::take(&mut self.nodes[index].node_children);
        for child in node_children {
            self.finish_node(child);
        }
    }
}

/// The line a leaf's prefix text starts on. Zero-width indentation error
/// leaves sit at the position of the token that follows them and never own
/// prefix bytes, so the prefix really begins where the last textual leaf
/// ended.
fn prefix_start_line(tree: &Tree, leaf: NodeId) -> u32 {
    let mut previous = tree.previous_leaf(leaf);
    while let Some(id) = previous {
        if !tree.is_indentation_error_leaf(id) {
            return tree.end_position(id).line;
        }
        previous = tree.previous_leaf(id);
    }
    1
}

/// Skips backwards over error leaves made from DEDENT tokens; they carry no
/// text and sit between a statement and its true last leaf.
fn skip_dedent_error_leaves(tree: &Tree, mut leaf: NodeId) -> NodeId {
    while tree.kind(leaf) == ERROR_LEAF && tree.token_kind(leaf) == DEDENT {
        match tree.previous_leaf(leaf) {
            Some(previous) => leaf = previous,
            None => break,
        }
    }
    leaf
}

/// Whether the logical line ending in `leaf` is closed, either by a newline
/// token or by a terminator at the end of `suffix`.
fn ends_with_newline(tree: &Tree, leaf: NodeId, suffix: &str) -> bool {
    let leaf = skip_dedent_error_leaves(tree, leaf);
    tree.token_kind(leaf) == NEWLINE || suffix.ends_with(['\n', '\r'])
}

/// The last document line `node` occupies, its own trailing prefix
/// included.
fn last_line(tree: &Tree, node: NodeId) -> u32 {
    let leaf = tree.last_leaf(node);
    if ends_with_newline(tree, leaf, "") {
        return tree.position(leaf).line;
    }
    match tree.next_leaf(leaf) {
        Some(next)
            if tree.kind(next) == ENDMARKER && tree.leaf_prefix(next).contains(['\n', '\r']) =>
        {
            tree.end_position(leaf).line + 1
        }
        _ => tree.end_position(leaf).line,
    }
}

fn func_or_class_has_suite(tree: &Tree, node: NodeId) -> bool {
    matches!(tree.kind(node), FUNCDEF | CLASSDEF)
        && tree.children(node).last().is_some_and(|&body| tree.kind(body) == SUITE)
}

/// Flow statements may still grow a clause (`else`, `except`, ...) out of
/// the lines that follow, so they are never safe as the last copied node.
fn is_flow_statement(tree: &Tree, node: NodeId) -> bool {
    matches!(tree.kind(node), IF_STMT | WHILE_STMT | FOR_STMT | TRY_STMT | WITH_STMT)
}
