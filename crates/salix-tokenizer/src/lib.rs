//! Resumable, indentation-aware tokenizer.
//!
//! A `Tokenizer` can start at any line of a document, seeded with the
//! indentation stack that was in effect there, and then reproduces exactly
//! the tokens a whole-file run would have emitted from that point on.
//! INDENT/DEDENT are emitted relative to the seeded stack; a dedent onto a
//! column the stack does not contain surfaces as `ERROR_DEDENT`.
//!
//! Whitespace, comments, blank lines, line-joining backslashes and newlines
//! inside brackets never form tokens of their own: they accumulate into the
//! `prefix` of the next token, so that concatenating `prefix + text` over
//! the stream reproduces the input exactly.

mod cursor;

use std::collections::VecDeque;

use cursor::{Cursor, EOF_CHAR};
pub use salix_tree::SyntaxKind;
use salix_tree::SyntaxKind::*;
use salix_tree::Position;

const BOM: char = '\u{feff}';

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: SyntaxKind,
    pub text: String,
    pub position: Position,
    pub prefix: String,
}

impl Token {
    fn indentation(kind: SyntaxKind, position: Position) -> Self {
        Self { kind, text: String::new(), position, prefix: String::new() }
    }
}

pub struct Tokenizer<'a> {
    lines: &'a [String],
    start_line: u32,
    document_start: bool,
    indents: Vec<u32>,

    line_idx: usize,
    col: usize,
    bom_width: usize,
    at_line_start: bool,
    bracket_depth: u32,
    prefix: String,
    pending: VecDeque<Token>,
    end_token: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    /// `start_line` is the document line number of `lines[0]` (1-based).
    /// `indents` is the stack of open indentation columns at that point;
    /// a whole-document run starts with `vec![0]`.
    pub fn new(
        lines: &'a [String],
        start_line: u32,
        indents: Vec<u32>,
        is_document_start: bool,
    ) -> Self {
        debug_assert!(!indents.is_empty());
        Self {
            lines,
            start_line,
            document_start: is_document_start,
            indents,
            line_idx: 0,
            col: 0,
            bom_width: 0,
            at_line_start: true,
            bracket_depth: 0,
            prefix: String::new(),
            pending: VecDeque::new(),
            end_token: None,
        }
    }

    /// The live indentation stack. Shrinks and grows as INDENT/DEDENT
    /// tokens are returned.
    pub fn indents(&self) -> &[u32] {
        &self.indents
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return token;
            }
            if let Some(end) = &self.end_token {
                return end.clone();
            }
            if self.line_idx >= self.lines.len() {
                self.finish(self.start_line + self.lines.len() as u32, 0);
                continue;
            }

            let line = &self.lines[self.line_idx];
            let (content_end, terminator) = split_terminator(line);

            if self.at_line_start && self.bracket_depth == 0 {
                self.begin_logical_line(line, content_end, terminator);
                continue;
            }

            if self.col >= content_end {
                if terminator.is_empty() {
                    // Last line, no trailing newline.
                    self.finish(self.line_no(), self.column());
                    continue;
                }
                if self.bracket_depth > 0 {
                    // Implicit line joining: the newline is prefix material.
                    self.prefix.push_str(terminator);
                    self.advance_line(false);
                    continue;
                }
                let token = Token {
                    kind: NEWLINE,
                    text: terminator.to_string(),
                    position: Position::new(self.line_no(), self.column()),
                    prefix: std::mem::take(&mut self.prefix),
                };
                self.advance_line(true);
                return token;
            }

            if let Some(token) = self.scan(content_end) {
                return token;
            }
        }
    }

    fn line_no(&self) -> u32 {
        self.start_line + self.line_idx as u32
    }

    fn column(&self) -> u32 {
        self.column_at(self.col)
    }

    fn column_at(&self, col: usize) -> u32 {
        let bom = if self.line_idx == 0 { self.bom_width } else { 0 };
        (col - bom) as u32
    }

    fn advance_line(&mut self, line_start: bool) {
        self.line_idx += 1;
        self.col = 0;
        self.at_line_start = line_start;
    }

    /// Handles the start of a logical line: byte order mark, blank and
    /// comment-only lines, and the indentation tokens.
    fn begin_logical_line(&mut self, line: &str, content_end: usize, terminator: &str) {
        if self.document_start && self.line_idx == 0 && self.col == 0 && line.starts_with(BOM) {
            self.prefix.push(BOM);
            self.col = BOM.len_utf8();
            self.bom_width = BOM.len_utf8();
        }

        let bytes = line.as_bytes();
        let mut i = self.col;
        while i < content_end && matches!(bytes[i], b' ' | b'\t' | b'\x0c') {
            i += 1;
        }

        if i >= content_end || bytes[i] == b'#' {
            // The whole line is prefix material.
            self.prefix.push_str(&line[self.col..]);
            if terminator.is_empty() {
                self.col = line.len();
                self.finish(self.line_no(), self.column());
            } else {
                self.advance_line(true);
            }
            return;
        }

        if bytes[i] == b'\\' && i + 1 >= content_end {
            // Explicit line joining; indentation is not re-measured.
            self.prefix.push_str(&line[self.col..]);
            self.advance_line(false);
            return;
        }

        self.prefix.push_str(&line[self.col..i]);
        self.col = i;
        self.at_line_start = false;

        let indent = self.column();
        let position = Position::new(self.line_no(), indent);
        let last = *self.indents.last().expect("indent stack is never empty");
        if indent > last {
            self.indents.push(indent);
            self.pending.push_back(Token::indentation(INDENT, position));
        } else if indent < last {
            while self.indents.len() > 1 && indent < *self.indents.last().expect("non-empty") {
                let below = self.indents[self.indents.len() - 2];
                if indent > below {
                    // No matching open scope: the stack top is adjusted so
                    // following lines at this column look consistent.
                    *self.indents.last_mut().expect("non-empty") = indent;
                    self.pending.push_back(Token::indentation(ERROR_DEDENT, position));
                    break;
                }
                self.indents.pop();
                self.pending.push_back(Token::indentation(DEDENT, position));
            }
        }
    }

    /// Scans one token (or swallows one run of prefix material) at the
    /// current column. Returns `None` when only prefix was consumed.
    fn scan(&mut self, content_end: usize) -> Option<Token> {
        let line: &str = &self.lines[self.line_idx];
        let rest = &line[self.col..content_end];
        let start_col = self.col;
        let mut cursor = Cursor::new(rest);

        match cursor.advance() {
            ' ' | '\t' | '\x0c' => {
                cursor.advance_while(|c| matches!(c, ' ' | '\t' | '\x0c'));
                let consumed: usize = cursor.consumed().into();
                self.prefix.push_str(&rest[..consumed]);
                self.col += consumed;
                None
            }
            '#' => {
                self.prefix.push_str(rest);
                self.col = content_end;
                None
            }
            '\\' if cursor.peek() == EOF_CHAR => {
                // Backslash right before the terminator joins the lines.
                self.prefix.push_str(&line[start_col..]);
                self.advance_line(false);
                None
            }
            c if is_identifier_start(c) => {
                cursor.advance_while(is_identifier_continue);
                let consumed: usize = cursor.consumed().into();
                let text = &rest[..consumed];
                if consumed <= 2
                    && text.bytes().all(|b| matches!(b, b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F'))
                    && matches!(cursor.peek(), '\'' | '"')
                {
                    return Some(self.scan_string(start_col, consumed));
                }
                self.col += consumed;
                Some(self.token(NAME, text.to_string(), start_col))
            }
            c if c.is_ascii_digit() || (c == '.' && cursor.peek().is_ascii_digit()) => {
                loop {
                    let p = cursor.peek();
                    if p.is_ascii_alphanumeric() || p == '_' || p == '.' {
                        cursor.advance();
                        if matches!(p, 'e' | 'E')
                            && !rest.starts_with("0x")
                            && !rest.starts_with("0X")
                            && matches!(cursor.peek(), '+' | '-')
                        {
                            cursor.advance();
                        }
                    } else {
                        break;
                    }
                }
                let consumed: usize = cursor.consumed().into();
                self.col += consumed;
                Some(self.token(NUMBER, rest[..consumed].to_string(), start_col))
            }
            '\'' | '"' => Some(self.scan_string(start_col, 0)),
            _ => {
                let len = operator_len(rest);
                if len == 0 {
                    let consumed: usize = cursor.consumed().into();
                    self.col += consumed;
                    return Some(self.token(ERRORTOKEN, rest[..consumed].to_string(), start_col));
                }
                let text = &rest[..len];
                match text {
                    "(" | "[" | "{" => self.bracket_depth += 1,
                    ")" | "]" | "}" => self.bracket_depth = self.bracket_depth.saturating_sub(1),
                    _ => {}
                }
                self.col += len;
                Some(self.token(OP, text.to_string(), start_col))
            }
        }
    }

    /// Scans a string literal starting at `start_col`; `prefix_len` bytes of
    /// literal prefix letters (`r`, `b`, ...) were already consumed. Strings
    /// may span physical lines (triple quotes, or a backslash before the
    /// terminator), so this owns its own line stepping.
    fn scan_string(&mut self, start_col: usize, prefix_len: usize) -> Token {
        let position = Position::new(self.line_no(), self.column_at(start_col));
        let line: &str = &self.lines[self.line_idx];
        let quote_col = start_col + prefix_len;
        let quote = line.as_bytes()[quote_col] as char;

        let (content_end, _) = split_terminator(line);
        let triple = line[quote_col..content_end.max(quote_col)]
            .as_bytes()
            .iter()
            .take(3)
            .filter(|&&b| b as char == quote)
            .count()
            == 3;
        let open_len = if triple { 3 } else { 1 };

        let mut text = String::from(&line[start_col..quote_col + open_len]);
        self.col = quote_col + open_len;

        loop {
            let line: &str = &self.lines[self.line_idx];
            let (content_end, _) = split_terminator(line);
            let scan_end = if triple { line.len() } else { content_end };
            let bytes = line.as_bytes();

            let mut i = self.col;
            while i < scan_end {
                let b = bytes[i];
                if b == b'\\' {
                    if i + 1 < scan_end {
                        // Escaped character; may be multi-byte, take it raw.
                        let mut end = i + 2;
                        while end < scan_end && !line.is_char_boundary(end) {
                            end += 1;
                        }
                        text.push_str(&line[i..end]);
                        i = end;
                        continue;
                    }
                    // Backslash before the terminator continues the string.
                    text.push_str(&line[i..]);
                    i = line.len();
                    break;
                }
                if b as char == quote {
                    let closes = !triple
                        || (bytes[i..].iter().take(3).filter(|&&q| q as char == quote).count() == 3);
                    if closes {
                        let close_len = if triple { 3 } else { 1 };
                        text.push_str(&line[i..i + close_len]);
                        self.col = i + close_len;
                        return self.token_at(STRING, text, position);
                    }
                }
                let mut end = i + 1;
                while end < scan_end && !line.is_char_boundary(end) {
                    end += 1;
                }
                text.push_str(&line[i..end]);
                i = end;
            }

            if !triple && i <= content_end {
                // Ran off the end of the line: unterminated.
                self.col = i;
                return self.token_at(ERRORTOKEN, text, position);
            }
            if self.line_idx + 1 >= self.lines.len() {
                // Unterminated at end of input.
                self.col = line.len();
                return self.token_at(ERRORTOKEN, text, position);
            }
            self.line_idx += 1;
            self.col = 0;
        }
    }

    fn token(&mut self, kind: SyntaxKind, text: String, start_col: usize) -> Token {
        let position = Position::new(self.line_no(), self.column_at(start_col));
        self.token_at(kind, text, position)
    }

    fn token_at(&mut self, kind: SyntaxKind, text: String, position: Position) -> Token {
        Token { kind, text, position, prefix: std::mem::take(&mut self.prefix) }
    }

    /// Emits the closing DEDENTs and the ENDMARKER carrying any remaining
    /// prefix (trailing blank lines and comments).
    fn finish(&mut self, line: u32, column: u32) {
        let position = Position::new(line, column);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.pending.push_back(Token::indentation(DEDENT, position));
        }
        let end = Token {
            kind: ENDMARKER,
            text: String::new(),
            position,
            prefix: std::mem::take(&mut self.prefix),
        };
        self.pending.push_back(end.clone());
        self.end_token = Some(Token { prefix: String::new(), ..end });
        self.line_idx = self.lines.len();
    }
}

/// Splits a physical line into content and line terminator.
fn split_terminator(line: &str) -> (usize, &str) {
    if line.ends_with("\r\n") {
        (line.len() - 2, &line[line.len() - 2..])
    } else if line.ends_with('\n') || line.ends_with('\r') {
        (line.len() - 1, &line[line.len() - 1..])
    } else {
        (line.len(), "")
    }
}

fn is_identifier_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_identifier_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Length in bytes of the operator at the start of `rest`, 0 if none.
fn operator_len(rest: &str) -> usize {
    const THREE: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
    const TWO: &[&str] = &[
        "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
        "@=", "&=", "|=", "^=",
    ];
    for op in THREE {
        if rest.starts_with(op) {
            return 3;
        }
    }
    for op in TWO {
        if rest.starts_with(op) {
            return 2;
        }
    }
    let first = rest.as_bytes()[0];
    if b"+-*/%@&|^~<>=().,:;[]{}".contains(&first) { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        salix_tree::split_lines(text, true).into_iter().map(str::to_string).collect()
    }

    fn tokenize_all(text: &str) -> Vec<Token> {
        let lines = lines(text);
        let mut tokenizer = Tokenizer::new(&lines, 1, vec![0], true);
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.next_token();
            let done = token.kind == ENDMARKER;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn kinds(tokens: &[Token]) -> Vec<SyntaxKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn round_trip(tokens: &[Token]) -> String {
        tokens.iter().map(|t| format!("{}{}", t.prefix, t.text)).collect()
    }

    #[test]
    fn simple_statement() {
        let tokens = tokenize_all("x = 1\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, NUMBER, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[1].prefix, " ");
        assert_eq!(tokens[3].text, "\n");
        assert_eq!(tokens[4].position, Position::new(2, 0));
        assert_eq!(round_trip(&tokens), "x = 1\n");
    }

    #[test]
    fn indent_and_dedent() {
        let tokens = tokenize_all("if x:\n    pass\ny\n");
        assert_eq!(
            kinds(&tokens),
            vec![NAME, NAME, OP, NEWLINE, INDENT, NAME, NEWLINE, DEDENT, NAME, NEWLINE, ENDMARKER]
        );
        // The indentation whitespace belongs to `pass`, not to the INDENT.
        assert_eq!(tokens[4].text, "");
        assert_eq!(tokens[4].prefix, "");
        assert_eq!(tokens[5].prefix, "    ");
        assert_eq!(tokens[5].position, Position::new(2, 4));
        assert_eq!(round_trip(&tokens), "if x:\n    pass\ny\n");
    }

    #[test]
    fn seeded_indent_stack_resumes_mid_document() {
        // As if lines 1..=2 were `def f():\n    x = 1\n` and we resume at
        // line 3 inside the suite.
        let lines = lines("    y = 2\nz = 3\n");
        let mut tokenizer = Tokenizer::new(&lines, 3, vec![0, 4], false);
        let mut tokens = Vec::new();
        loop {
            let token = tokenizer.next_token();
            let done = token.kind == ENDMARKER;
            tokens.push(token);
            if done {
                break;
            }
        }
        // No INDENT: column 4 is already on the stack.
        assert_eq!(
            kinds(&tokens),
            vec![NAME, OP, NUMBER, NEWLINE, DEDENT, NAME, OP, NUMBER, NEWLINE, ENDMARKER]
        );
        assert_eq!(tokens[0].position, Position::new(3, 4));
        assert_eq!(tokens[5].position, Position::new(4, 0));
    }

    #[test]
    fn error_dedent_on_unknown_column() {
        let lines = lines("  x\n");
        let mut tokenizer = Tokenizer::new(&lines, 5, vec![0, 4], false);
        let first = tokenizer.next_token();
        assert_eq!(first.kind, ERROR_DEDENT);
        assert_eq!(first.position, Position::new(5, 2));
        assert_eq!(first.text, "");
        // The stack top was adjusted to the observed column.
        assert_eq!(tokenizer.indents(), &[0, 2]);
        let name = tokenizer.next_token();
        assert_eq!(name.kind, NAME);
        assert_eq!(name.prefix, "  ");
    }

    #[test]
    fn blank_and_comment_lines_become_prefix() {
        let tokens = tokenize_all("x\n\n# note\ny\n");
        assert_eq!(kinds(&tokens), vec![NAME, NEWLINE, NAME, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[2].prefix, "\n# note\n");
        assert_eq!(tokens[2].position, Position::new(4, 0));
    }

    #[test]
    fn trailing_blank_lines_go_to_endmarker() {
        let tokens = tokenize_all("x\n\n\n");
        assert_eq!(kinds(&tokens), vec![NAME, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[2].prefix, "\n\n");
        assert_eq!(tokens[2].position, Position::new(4, 0));
    }

    #[test]
    fn dedents_close_before_endmarker() {
        let tokens = tokenize_all("if x:\n    pass\n");
        assert_eq!(
            kinds(&tokens),
            vec![NAME, NAME, OP, NEWLINE, INDENT, NAME, NEWLINE, DEDENT, ENDMARKER]
        );
    }

    #[test]
    fn brackets_join_lines() {
        let tokens = tokenize_all("f(1,\n  2)\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, NUMBER, OP, NUMBER, OP, NEWLINE, ENDMARKER]);
        // The newline and continuation indentation are prefix of `2`.
        assert_eq!(tokens[4].prefix, "\n  ");
        assert_eq!(round_trip(&tokens), "f(1,\n  2)\n");
    }

    #[test]
    fn backslash_joins_lines() {
        let tokens = tokenize_all("x = \\\n    1\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, NUMBER, NEWLINE, ENDMARKER]);
        // The space before the backslash is prefix material too.
        assert_eq!(tokens[2].prefix, " \\\n    ");
        assert_eq!(tokens[2].position, Position::new(2, 4));
        assert_eq!(round_trip(&tokens), "x = \\\n    1\n");
    }

    #[test]
    fn strings() {
        let tokens = tokenize_all("a = 'b' + r\"c\"\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, STRING, OP, STRING, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[2].text, "'b'");
        assert_eq!(tokens[4].text, "r\"c\"");
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        let text = "s = '''a\nb'''\nt\n";
        let tokens = tokenize_all(text);
        assert_eq!(kinds(&tokens), vec![NAME, OP, STRING, NEWLINE, NAME, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[2].text, "'''a\nb'''");
        assert_eq!(tokens[4].position, Position::new(3, 0));
        assert_eq!(round_trip(&tokens), text);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let tokens = tokenize_all("x = 'oops\ny\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, ERRORTOKEN, NEWLINE, NAME, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[2].text, "'oops");
    }

    #[test]
    fn crlf_terminators_are_preserved() {
        let tokens = tokenize_all("x\r\ny\r\n");
        assert_eq!(kinds(&tokens), vec![NAME, NEWLINE, NAME, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[1].text, "\r\n");
        assert_eq!(round_trip(&tokens), "x\r\ny\r\n");
    }

    #[test]
    fn missing_final_newline() {
        let tokens = tokenize_all("x = 1");
        assert_eq!(kinds(&tokens), vec![NAME, OP, NUMBER, ENDMARKER]);
        assert_eq!(tokens[3].position, Position::new(1, 5));
    }

    #[test]
    fn bom_is_prefix_with_zero_width() {
        let tokens = tokenize_all("\u{feff}x = 1\n");
        assert_eq!(kinds(&tokens), vec![NAME, OP, NUMBER, NEWLINE, ENDMARKER]);
        assert_eq!(tokens[0].prefix, "\u{feff}");
        assert_eq!(tokens[0].position, Position::new(1, 0));
        assert_eq!(round_trip(&tokens), "\u{feff}x = 1\n");
    }

    #[test]
    fn operators() {
        let tokens = tokenize_all("a **= b // c != d\n");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "**=", "b", "//", "c", "!=", "d", "\n", ""]);
    }
}
