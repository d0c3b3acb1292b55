use rustc_hash::FxHashMap;
use salix_tokenizer::{Token, Tokenizer};
use salix_tree::SyntaxKind::*;
use salix_tree::{NodeId, Position, Tree};

/// Limits a chunk parse to the still-dirty region of the document.
///
/// Tokens flow through unchanged until the document dedents out of the
/// chunk's initial indentation, or a logical line at or past `until_line`
/// has been closed and the grammar is at a statement boundary. At that
/// point an `ENDMARKER` is synthesized and the rest of the token stream is
/// never touched, leaving the remaining lines for copying or for a later
/// chunk.
pub(crate) struct Fence {
    pub(crate) until_line: u32,
    pub(crate) initial_indents: usize,
}

/// Everything the incremental updater needs back from one chunk parse.
pub(crate) struct ParsedChunk {
    pub(crate) module: NodeId,
    /// Indentation stack as it was when a `def`/`class` keyword was seen,
    /// keyed by the keyword's position.
    pub(crate) keyword_indents: FxHashMap<Position, Vec<u32>>,
    /// Set when the chunk ended on an `ERROR_DEDENT`: the column the open
    /// indentation scope should be adjusted to.
    pub(crate) replace_tos_indent: Option<u32>,
    /// Final indentation stack of the tokenizer.
    pub(crate) indents: Vec<u32>,
}

pub(crate) struct Parser<'t, 'l> {
    pub(crate) tree: &'t mut Tree,
    tokenizer: Tokenizer<'l>,
    fence: Option<Fence>,
    lookahead: Option<Token>,
    was_newline: bool,
    end_token: Option<Token>,
    open_flows: usize,
    suite_stmts: Vec<usize>,
    keyword_indents: FxHashMap<Position, Vec<u32>>,
    replace_tos_indent: Option<u32>,
}

impl<'t, 'l> Parser<'t, 'l> {
    pub(crate) fn new(tree: &'t mut Tree, tokenizer: Tokenizer<'l>, fence: Option<Fence>) -> Self {
        Self {
            tree,
            tokenizer,
            fence,
            lookahead: None,
            was_newline: false,
            end_token: None,
            open_flows: 0,
            suite_stmts: Vec::new(),
            keyword_indents: FxHashMap::default(),
            replace_tos_indent: None,
        }
    }

    /// Parses one fenced chunk into a fresh, detached `MODULE` node.
    pub(crate) fn parse_chunk(mut self) -> ParsedChunk {
        let module = self.tree.alloc_node(MODULE);
        crate::grammar::file(&mut self, module);
        ParsedChunk {
            module,
            keyword_indents: std::mem::take(&mut self.keyword_indents),
            replace_tos_indent: self.replace_tos_indent,
            indents: self.tokenizer.indents().to_vec(),
        }
    }

    /// Parses the whole token stream into `module`.
    pub(crate) fn parse_file(mut self, module: NodeId) {
        crate::grammar::file(&mut self, module);
    }

    pub(crate) fn peek(&mut self) -> &Token {
        if self.lookahead.is_none() {
            let token = self.fetch();
            self.lookahead = Some(token);
        }
        self.lookahead.as_ref().expect("lookahead was just filled")
    }

    pub(crate) fn bump(&mut self) -> Token {
        match self.lookahead.take() {
            Some(token) => token,
            None => self.fetch(),
        }
    }

    pub(crate) fn leaf(&mut self, token: Token) -> NodeId {
        self.tree.alloc_leaf(token.kind, token.text, token.prefix, token.position)
    }

    pub(crate) fn error_leaf(&mut self, token: Token) -> NodeId {
        self.tree.alloc_error_leaf(token.kind, token.text, token.prefix, token.position)
    }

    pub(crate) fn begin_flow(&mut self) {
        self.open_flows += 1;
    }

    pub(crate) fn end_flow(&mut self) {
        self.open_flows -= 1;
    }

    pub(crate) fn begin_suite(&mut self) {
        self.suite_stmts.push(0);
    }

    pub(crate) fn end_suite(&mut self) {
        self.suite_stmts.pop();
    }

    pub(crate) fn count_suite_stmt(&mut self) {
        if let Some(count) = self.suite_stmts.last_mut() {
            *count += 1;
        }
    }

    /// At a statement boundary with no flow awaiting continuation and the
    /// innermost suite non-empty, the chunk may be closed here.
    fn at_valid_stop(&self) -> bool {
        self.open_flows == 0 && self.suite_stmts.last().is_none_or(|&count| count > 0)
    }

    /// Pulls the next token, applying the fence when one is set.
    fn fetch(&mut self) -> Token {
        if let Some(end) = &self.end_token {
            return end.clone();
        }
        let token = self.tokenizer.next_token();
        let Some(fence) = &self.fence else {
            return token;
        };

        match token.kind {
            DEDENT if self.tokenizer.indents().len() < fence.initial_indents => {
                // Dedented out of the chunk's scope: discard the dedent run
                // and end the chunk right before the next real token.
                let mut next = self.tokenizer.next_token();
                loop {
                    match next.kind {
                        DEDENT => {}
                        ERROR_DEDENT => {
                            self.replace_tos_indent = Some(next.position.column + 1);
                        }
                        _ => break,
                    }
                    next = self.tokenizer.next_token();
                }
                let mut prefix = next.prefix;
                if let Some(index) = prefix.rfind(['\n', '\r']) {
                    // Keep whole lines only; the partial last line belongs
                    // to whatever parses these lines next.
                    prefix.truncate(index + 1);
                } else if next.position.column as usize == prefix.len() {
                    prefix.clear();
                }
                return self.end_here(next.position, prefix);
            }
            DEDENT => {}
            NEWLINE if token.position.line >= fence.until_line => {
                self.was_newline = true;
            }
            _ => {
                if self.was_newline {
                    self.was_newline = false;
                    if self.tokenizer.indents().len() == fence.initial_indents
                        && self.at_valid_stop()
                    {
                        return self.end_here(token.position, String::new());
                    }
                }
            }
        }

        if token.kind == NAME && matches!(token.text.as_str(), "def" | "class") {
            self.keyword_indents.insert(token.position, self.tokenizer.indents().to_vec());
        }
        token
    }

    fn end_here(&mut self, position: Position, prefix: String) -> Token {
        let end = Token { kind: ENDMARKER, text: String::new(), position, prefix };
        self.end_token = Some(Token { prefix: String::new(), ..end.clone() });
        end
    }
}
