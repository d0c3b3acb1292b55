//! Incremental, error-tolerant parsing of indentation-structured source.
//!
//! [`parse`] builds a [`Tree`] from scratch; [`DiffParser`] updates an
//! existing tree to a new version of the text, re-parsing only around the
//! changed lines and copying unchanged statements over. [`ParserCache`]
//! wraps both behind a per-file cache.
//!
//! Trees always serialize back to their source byte for byte, whatever
//! errors the source contains.

mod cache;
mod diff;
mod grammar;
mod parser;

#[cfg(test)]
mod tests;

use salix_tokenizer::Tokenizer;

pub use cache::ParserCache;
pub use diff::{DiffError, DiffParser};
pub use salix_tree::{NodeId, Position, SyntaxKind, Tree, split_lines};

use crate::parser::Parser;

/// Parses a whole document from scratch.
pub fn parse(text: &str) -> Tree {
    let lines: Vec<String> =
        split_lines(text, true).iter().map(|line| (*line).to_string()).collect();
    parse_lines(&lines)
}

/// Like [`parse`], for a document already split into terminated lines.
pub fn parse_lines(lines: &[String]) -> Tree {
    let mut tree = Tree::new();
    let root = tree.root();
    let tokenizer = Tokenizer::new(lines, 1, vec![0], true);
    Parser::new(&mut tree, tokenizer, None).parse_file(root);
    tree
}
