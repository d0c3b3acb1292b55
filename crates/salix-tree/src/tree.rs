use std::fmt::Write as _;

use crate::kind::SyntaxKind;
use crate::text::split_lines;

/// A `(line, column)` source position. Lines are 1-based, columns are
/// 0-based UTF-8 byte offsets within the line.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Index of a node or leaf inside one [`Tree`] arena.
///
/// Ids are only meaningful for the arena that produced them and are
/// invalidated by the next incremental update.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

enum NodeData {
    Node { kind: SyntaxKind, parent: Option<NodeId>, children: Vec<NodeId> },
    Leaf {
        kind: SyntaxKind,
        /// For `ERROR_LEAF` the token kind the leaf was produced from;
        /// equals `kind` for ordinary leaves.
        token: SyntaxKind,
        parent: Option<NodeId>,
        text: String,
        prefix: String,
        position: Position,
    },
}

/// An arena of parse-tree nodes with a single `MODULE` root.
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut tree = Self { nodes: Vec::new(), root: NodeId(0) };
        tree.root = tree.alloc_node(SyntaxKind::MODULE);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn alloc_node(&mut self, kind: SyntaxKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData::Node { kind, parent: None, children: Vec::new() });
        id
    }

    pub fn alloc_leaf(
        &mut self,
        kind: SyntaxKind,
        text: String,
        prefix: String,
        position: Position,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData::Leaf { kind, token: kind, parent: None, text, prefix, position });
        id
    }

    /// Allocates an `ERROR_LEAF` remembering the token kind it came from.
    pub fn alloc_error_leaf(
        &mut self,
        token: SyntaxKind,
        text: String,
        prefix: String,
        position: Position,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData::Leaf {
            kind: SyntaxKind::ERROR_LEAF,
            token,
            parent: None,
            text,
            prefix,
            position,
        });
        id
    }

    pub fn kind(&self, id: NodeId) -> SyntaxKind {
        match &self.nodes[id.index()] {
            NodeData::Node { kind, .. } | NodeData::Leaf { kind, .. } => *kind,
        }
    }

    /// The token kind of a leaf; for `ERROR_LEAF` the wrapped token kind.
    pub fn token_kind(&self, id: NodeId) -> SyntaxKind {
        match &self.nodes[id.index()] {
            NodeData::Leaf { token, .. } => *token,
            NodeData::Node { .. } => panic!("token_kind called on a node"),
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.index()], NodeData::Leaf { .. })
    }

    /// True for an `ERROR_LEAF` produced from an indentation token.
    pub fn is_indentation_error_leaf(&self, id: NodeId) -> bool {
        match &self.nodes[id.index()] {
            NodeData::Leaf { kind: SyntaxKind::ERROR_LEAF, token, .. } => token.is_indentation(),
            _ => false,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.index()] {
            NodeData::Node { children, .. } => children,
            NodeData::Leaf { .. } => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match &self.nodes[id.index()] {
            NodeData::Node { parent, .. } | NodeData::Leaf { parent, .. } => *parent,
        }
    }

    fn set_parent(&mut self, id: NodeId, new_parent: Option<NodeId>) {
        match &mut self.nodes[id.index()] {
            NodeData::Node { parent, .. } | NodeData::Leaf { parent, .. } => *parent = new_parent,
        }
    }

    /// Replaces the children of `id` and reattaches their parent links.
    pub fn set_children(&mut self, id: NodeId, new_children: Vec<NodeId>) {
        for &child in &new_children {
            self.set_parent(child, Some(id));
        }
        match &mut self.nodes[id.index()] {
            NodeData::Node { children, .. } => *children = new_children,
            NodeData::Leaf { .. } => panic!("set_children called on a leaf"),
        }
    }

    pub fn push_child(&mut self, id: NodeId, child: NodeId) {
        self.set_parent(child, Some(id));
        match &mut self.nodes[id.index()] {
            NodeData::Node { children, .. } => children.push(child),
            NodeData::Leaf { .. } => panic!("push_child called on a leaf"),
        }
    }

    pub fn leaf_text(&self, id: NodeId) -> &str {
        match &self.nodes[id.index()] {
            NodeData::Leaf { text, .. } => text,
            NodeData::Node { .. } => panic!("leaf_text called on a node"),
        }
    }

    pub fn leaf_prefix(&self, id: NodeId) -> &str {
        match &self.nodes[id.index()] {
            NodeData::Leaf { prefix, .. } => prefix,
            NodeData::Node { .. } => panic!("leaf_prefix called on a node"),
        }
    }

    pub fn set_leaf_prefix(&mut self, id: NodeId, new_prefix: String) {
        match &mut self.nodes[id.index()] {
            NodeData::Leaf { prefix, .. } => *prefix = new_prefix,
            NodeData::Node { .. } => panic!("set_leaf_prefix called on a node"),
        }
    }

    pub fn prepend_leaf_prefix(&mut self, id: NodeId, extra: &str) {
        if extra.is_empty() {
            return;
        }
        match &mut self.nodes[id.index()] {
            NodeData::Leaf { prefix, .. } => prefix.insert_str(0, extra),
            NodeData::Node { .. } => panic!("prepend_leaf_prefix called on a node"),
        }
    }

    pub fn position(&self, id: NodeId) -> Position {
        match &self.nodes[id.index()] {
            NodeData::Leaf { position, .. } => *position,
            NodeData::Node { .. } => panic!("position called on a node"),
        }
    }

    pub fn shift_leaf_line(&mut self, id: NodeId, line_offset: i32) {
        match &mut self.nodes[id.index()] {
            NodeData::Leaf { position, .. } => {
                position.line = (position.line as i64 + line_offset as i64) as u32;
            }
            NodeData::Node { .. } => panic!("shift_leaf_line called on a node"),
        }
    }

    /// Start position of a node or leaf, the leaf prefix excluded.
    pub fn start_position(&self, id: NodeId) -> Position {
        self.position(self.first_leaf(id))
    }

    /// Column of the first leaf, i.e. the source indentation of a statement.
    pub fn indentation(&self, id: NodeId) -> u32 {
        self.start_position(id).column
    }

    /// Position one past the last character of `id`'s text.
    pub fn end_position(&self, id: NodeId) -> Position {
        let leaf = self.last_leaf(id);
        let position = self.position(leaf);
        advance_position(position, self.leaf_text(leaf))
    }

    /// Where the leaf's prefix begins: the end of the previous leaf, or the
    /// start of the document.
    pub fn start_position_of_prefix(&self, leaf: NodeId) -> Position {
        match self.previous_leaf(leaf) {
            Some(previous) => self.end_position(previous),
            None => Position::new(1, 0),
        }
    }

    pub fn first_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(&first) = self.children(id).first() {
            id = first;
        }
        id
    }

    pub fn last_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(&last) = self.children(id).last() {
            id = last;
        }
        id
    }

    pub fn next_leaf(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let parent = self.parent(id)?;
            let siblings = self.children(parent);
            let index = siblings.iter().position(|&c| c == id).expect("detached child");
            match siblings.get(index + 1) {
                Some(&next) => return Some(self.first_leaf(next)),
                None => id = parent,
            }
        }
    }

    pub fn previous_leaf(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let parent = self.parent(id)?;
            let siblings = self.children(parent);
            let index = siblings.iter().position(|&c| c == id).expect("detached child");
            match index.checked_sub(1) {
                Some(previous) => return Some(self.last_leaf(siblings[previous])),
                None => id = parent,
            }
        }
    }

    /// The leaf covering `position`. With `include_prefixes` the leaf's
    /// prefix counts as part of its range.
    pub fn leaf_for_position(&self, position: Position, include_prefixes: bool) -> Option<NodeId> {
        if position < Position::new(1, 0) || position > self.end_position(self.root) {
            return None;
        }

        let mut node = self.root;
        loop {
            let children = self.children(node);
            if children.is_empty() {
                return None;
            }
            let index = children.partition_point(|&child| self.end_position(child) < position);
            let element = *children.get(index)?;
            if self.is_leaf(element) {
                if !include_prefixes && position < self.position(element) {
                    return None;
                }
                return Some(element);
            }
            node = element;
        }
    }

    /// Serializes the subtree at `id` back to source text.
    pub fn code_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_code(id, &mut out);
        out
    }

    /// Serializes the whole tree; the round-trip counterpart of parsing.
    pub fn text(&self) -> String {
        self.code_of(self.root)
    }

    fn write_code(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.index()] {
            NodeData::Leaf { text, prefix, .. } => {
                out.push_str(prefix);
                out.push_str(text);
            }
            NodeData::Node { children, .. } => {
                for &child in children {
                    self.write_code(child, out);
                }
            }
        }
    }

    /// Deep-copies a subtree out of another arena, returning the new root.
    /// The copy is detached; positions are taken over verbatim.
    pub fn copy_subtree(&mut self, src: &Tree, src_id: NodeId) -> NodeId {
        match &src.nodes[src_id.index()] {
            NodeData::Leaf { kind, token, text, prefix, position, .. } => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(NodeData::Leaf {
                    kind: *kind,
                    token: *token,
                    parent: None,
                    text: text.clone(),
                    prefix: prefix.clone(),
                    position: *position,
                });
                id
            }
            NodeData::Node { kind, children, .. } => {
                let id = self.alloc_node(*kind);
                let copied: Vec<NodeId> =
                    children.iter().map(|&child| self.copy_subtree(src, child)).collect();
                self.set_children(id, copied);
                id
            }
        }
    }

    /// Adds `line_offset` to every leaf under `nodes` in tree order, stopping
    /// right after `stop_leaf` has been patched. Returns whether the stop
    /// leaf was reached.
    pub fn shift_lines(&mut self, nodes: &[NodeId], line_offset: i32, stop_leaf: NodeId) -> bool {
        for &node in nodes {
            if self.is_leaf(node) {
                self.shift_leaf_line(node, line_offset);
                if node == stop_leaf {
                    return true;
                }
            } else {
                let children = self.children(node).to_vec();
                if self.shift_lines(&children, line_offset, stop_leaf) {
                    return true;
                }
            }
        }
        false
    }

    /// A line-oriented debug rendering of the subtree, for tests.
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_dump(id, 0, &mut out);
        out
    }

    fn write_dump(&self, id: NodeId, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match &self.nodes[id.index()] {
            NodeData::Leaf { kind, token, text, prefix, position, .. } => {
                if *kind == SyntaxKind::ERROR_LEAF {
                    let _ = write!(out, "ERROR_LEAF({token:?})");
                } else {
                    let _ = write!(out, "{kind:?}");
                }
                let _ = writeln!(
                    out,
                    "@{}:{} {:?} prefix {:?}",
                    position.line, position.column, text, prefix
                );
            }
            NodeData::Node { kind, children, .. } => {
                let _ = writeln!(out, "{kind:?}");
                for &child in children {
                    self.write_dump(child, depth + 1, out);
                }
            }
        }
    }
}

fn advance_position(position: Position, text: &str) -> Position {
    if text.contains(['\n', '\r']) {
        let lines = split_lines(text, true);
        Position::new(
            position.line + lines.len() as u32 - 1,
            lines.last().map_or(0, |last| last.len() as u32),
        )
    } else {
        Position::new(position.line, position.column + text.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::SyntaxKind::*;

    fn leaf(tree: &mut Tree, kind: SyntaxKind, text: &str, prefix: &str, pos: (u32, u32)) -> NodeId {
        tree.alloc_leaf(kind, text.into(), prefix.into(), Position::new(pos.0, pos.1))
    }

    /// `x = 1\n` as a one-statement module.
    fn small_module() -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let stmt = tree.alloc_node(SIMPLE_STMT);
        let x = leaf(&mut tree, NAME, "x", "", (1, 0));
        let eq = leaf(&mut tree, OP, "=", " ", (1, 2));
        let one = leaf(&mut tree, NUMBER, "1", " ", (1, 4));
        let newline = leaf(&mut tree, NEWLINE, "\n", "", (1, 5));
        tree.set_children(stmt, vec![x, eq, one, newline]);
        let end = leaf(&mut tree, ENDMARKER, "", "", (2, 0));
        let root = tree.root();
        tree.set_children(root, vec![stmt, end]);
        (tree, stmt)
    }

    #[test]
    fn serialization_concatenates_prefix_and_text() {
        let (tree, _) = small_module();
        assert_eq!(tree.text(), "x = 1\n");
    }

    #[test]
    fn end_position_counts_terminators() {
        let (tree, stmt) = small_module();
        assert_eq!(tree.end_position(stmt), Position::new(2, 0));
        assert_eq!(tree.start_position(stmt), Position::new(1, 0));
    }

    #[test]
    fn leaf_navigation() {
        let (tree, stmt) = small_module();
        let first = tree.first_leaf(tree.root());
        assert_eq!(tree.leaf_text(first), "x");
        let last = tree.last_leaf(stmt);
        assert_eq!(tree.kind(last), NEWLINE);
        let next = tree.next_leaf(last).unwrap();
        assert_eq!(tree.kind(next), ENDMARKER);
        assert_eq!(tree.previous_leaf(next), Some(last));
        assert_eq!(tree.previous_leaf(first), None);
    }

    #[test]
    fn leaf_for_position_boundaries() {
        let (tree, _) = small_module();
        // (1, 4) is the start of `1`, (1, 2) the start of `=`.
        let leaf = tree.leaf_for_position(Position::new(1, 4), true).unwrap();
        assert_eq!(tree.leaf_text(leaf), "1");
        let leaf = tree.leaf_for_position(Position::new(1, 2), true).unwrap();
        assert_eq!(tree.leaf_text(leaf), "=");
        // The start of line 2 lands on the newline that ends line 1.
        let leaf = tree.leaf_for_position(Position::new(2, 0), true).unwrap();
        assert_eq!(tree.kind(leaf), NEWLINE);
        assert_eq!(tree.leaf_for_position(Position::new(9, 0), true), None);
    }

    #[test]
    fn copy_subtree_detaches_and_preserves_text() {
        let (old, stmt) = small_module();
        let mut new = Tree::new();
        let copied = new.copy_subtree(&old, stmt);
        assert_eq!(new.parent(copied), None);
        assert_eq!(new.code_of(copied), "x = 1\n");
        assert_eq!(new.start_position(copied), Position::new(1, 0));
    }

    #[test]
    fn shift_lines_stops_at_sentinel_leaf() {
        let (mut tree, stmt) = small_module();
        let children = tree.children(stmt).to_vec();
        let eq = children[1];
        // Patch only up to `=`; the rest of the statement keeps its lines.
        assert!(tree.shift_lines(&[stmt], 3, eq));
        assert_eq!(tree.position(children[0]).line, 4);
        assert_eq!(tree.position(children[1]).line, 4);
        assert_eq!(tree.position(children[2]).line, 1);
        assert_eq!(tree.position(children[3]).line, 1);
    }
}
