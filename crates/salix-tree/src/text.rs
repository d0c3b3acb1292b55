/// Splits `text` into lines on `\n`, `\r\n` and lone `\r`.
///
/// The result always contains at least one element and, when the text ends
/// with a terminator, a trailing empty line, so that re-joining the lines
/// reproduces `text` exactly when `keepends` is true.
pub fn split_lines(text: &str, keepends: bool) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(line(text, start, i + 1, keepends, 1));
                i += 1;
                start = i;
            }
            b'\r' => {
                let end = if bytes.get(i + 1) == Some(&b'\n') { i + 2 } else { i + 1 };
                lines.push(line(text, start, end, keepends, end - i));
                i = end;
                start = i;
            }
            _ => i += 1,
        }
    }

    lines.push(&text[start..]);
    lines
}

fn line(text: &str, start: usize, end: usize, keepends: bool, terminator_len: usize) -> &str {
    if keepends { &text[start..end] } else { &text[start..end - terminator_len] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_one_line() {
        assert_eq!(split_lines("", true), vec![""]);
    }

    #[test]
    fn trailing_terminator_adds_empty_line() {
        assert_eq!(split_lines("a\nb\n", true), vec!["a\n", "b\n", ""]);
        assert_eq!(split_lines("a\nb", true), vec!["a\n", "b"]);
    }

    #[test]
    fn mixed_terminators() {
        assert_eq!(split_lines("a\r\nb\rc\n", true), vec!["a\r\n", "b\r", "c\n", ""]);
        assert_eq!(split_lines("a\r\nb\rc\n", false), vec!["a", "b", "c", ""]);
    }

    #[test]
    fn rejoining_restores_text() {
        let text = "x = 1\r\nif x:\n\tpass\r";
        assert_eq!(split_lines(text, true).concat(), text);
    }
}
