use std::str::Chars;

use text_size::{TextLen, TextSize};

pub(crate) const EOF_CHAR: char = '\0';

/// Scanning cursor over the remainder of one physical line.
pub(crate) struct Cursor<'a> {
    chars: Chars<'a>,
    len: TextSize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { chars: text.chars(), len: text.text_len() }
    }

    fn remaining(&self) -> TextSize {
        TextSize::new(self.chars.as_str().len() as u32)
    }

    /// Bytes consumed since construction.
    pub(crate) fn consumed(&self) -> TextSize {
        self.len - self.remaining()
    }

    pub(crate) fn peek(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    pub(crate) fn advance(&mut self) -> char {
        self.chars.next().unwrap_or(EOF_CHAR)
    }

    pub(crate) fn advance_while(&mut self, f: impl Fn(char) -> bool + Copy) {
        while self.peek() != EOF_CHAR && f(self.peek()) {
            self.advance();
        }
    }
}
