use std::collections::hash_map::Entry;

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use salix_tree::{Tree, split_lines};
use tracing::{debug, warn};

use crate::DiffParser;

struct CachedFile {
    lines: Vec<String>,
    tree: Tree,
}

/// Keeps the last parsed tree of every file and updates it incrementally
/// when a new version of the text arrives. A failed incremental update is
/// logged and silently replaced by a parse from scratch.
#[derive(Default)]
pub struct ParserCache {
    files: FxHashMap<Utf8PathBuf, CachedFile>,
}

impl ParserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `text`, reusing the previously cached tree of `path` where
    /// the text allows, and caches the result.
    pub fn update(&mut self, path: &Utf8Path, text: &str) -> &Tree {
        let new_lines: Vec<String> =
            split_lines(text, true).iter().map(|line| (*line).to_string()).collect();
        match self.files.entry(path.to_owned()) {
            Entry::Occupied(slot) => {
                let file = slot.into_mut();
                if file.lines == new_lines {
                    debug!(%path, "text unchanged, tree reused");
                } else {
                    file.tree = match DiffParser::new(&file.tree).update(&file.lines, &new_lines) {
                        Ok(tree) => tree,
                        Err(error) => {
                            warn!(%path, %error, "incremental update failed, parsing from scratch");
                            crate::parse(text)
                        }
                    };
                    file.lines = new_lines;
                }
                &file.tree
            }
            Entry::Vacant(slot) => {
                let file = slot.insert(CachedFile { lines: new_lines, tree: crate::parse(text) });
                &file.tree
            }
        }
    }

    /// Drops the cached tree of `path`. Returns whether one was cached.
    pub fn invalidate(&mut self, path: &Utf8Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}
