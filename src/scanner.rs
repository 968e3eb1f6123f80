//! Token scanner for policy source files.
//!
//! Produces (position, literal) pairs over an in-memory buffer. Whitespace
//! and `#`-comments are skipped between tokens; comment text stays in the
//! buffer and is recovered later by the printer, addressed by byte position.

use std::sync::Arc;

use miette::{NamedSource, SourceSpan};

use crate::errors::PolicyError;

/// Characters that always form a one-byte token.
fn is_single(b: u8) -> bool {
    matches!(b, b',' | b';' | b'=' | b'{' | b'}' | b']' | b'&' | b'!')
}

/// Bytes of context shown on each side of the `<--HERE-->` marker.
const CONTEXT_WINDOW: usize = 40;

pub struct Scanner<'s> {
    src: &'s str,
    file: &'s str,
    offset: usize,
}

impl<'s> Scanner<'s> {
    pub fn new(src: &'s str, file: &'s str) -> Self {
        Self {
            src,
            file,
            offset: 0,
        }
    }

    /// End offset of the most recently scanned token.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Advance past whitespace and comments, then scan one token.
    /// Returns `(len, "")` at end of input.
    pub fn token(&mut self) -> (usize, &'s str) {
        self.skip_space();
        let bytes = self.src.as_bytes();
        let start = self.offset;
        if start >= bytes.len() {
            return (start, "");
        }
        if is_single(bytes[start]) {
            self.offset = start + 1;
            return (start, &self.src[start..self.offset]);
        }
        let mut i = start;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'[' {
                // '[' terminates a word but belongs to it: "host:[", ".[".
                i += 1;
                break;
            }
            if b.is_ascii_whitespace() || is_single(b) || b == b'#' {
                break;
            }
            i += 1;
        }
        self.offset = i;
        (start, &self.src[start..i])
    }

    /// Rest of the current line, verbatim with trailing whitespace trimmed.
    /// Used for free-form description text; `#` here is literal.
    pub fn to_eol(&mut self) -> (usize, &'s str) {
        let start = self.offset;
        let end = self.src[start..]
            .find('\n')
            .map_or(self.src.len(), |i| start + i);
        self.offset = end;
        (start, self.src[start..end].trim_end())
    }

    fn skip_space(&mut self) {
        let bytes = self.src.as_bytes();
        while self.offset < bytes.len() {
            let b = bytes[self.offset];
            if b.is_ascii_whitespace() {
                self.offset += 1;
            } else if b == b'#' {
                while self.offset < bytes.len() && bytes[self.offset] != b'\n' {
                    self.offset += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Build the fatal diagnostic at the current offset: 1-based line number
    /// plus a bounded same-line context window with a `<--HERE-->` marker.
    pub fn syntax_err(&self, expectation: &str) -> PolicyError {
        let pos = self.offset.min(self.src.len());
        let line = self.src[..pos].bytes().filter(|b| *b == b'\n').count() as u32 + 1;

        let line_start = self.src[..pos].rfind('\n').map_or(0, |i| i + 1);
        let line_end = self.src[pos..]
            .find('\n')
            .map_or(self.src.len(), |i| pos + i);

        let mut prefix = self.src[line_start..pos].trim_start();
        if prefix.len() > CONTEXT_WINDOW {
            let mut cut = prefix.len() - CONTEXT_WINDOW;
            while !prefix.is_char_boundary(cut) {
                cut += 1;
            }
            prefix = &prefix[cut..];
        }
        let mut suffix = self.src[pos..line_end].trim_end();
        if suffix.len() > CONTEXT_WINDOW {
            let mut cut = CONTEXT_WINDOW;
            while !suffix.is_char_boundary(cut) {
                cut -= 1;
            }
            suffix = &suffix[..cut];
        }
        let context = format!("{prefix}<--HERE-->{suffix}");

        let source = Arc::new(NamedSource::new(self.file, self.src.to_string()));
        let span_end = (pos + 1).min(self.src.len()).max(pos);
        let span = SourceSpan::from(pos..span_end);
        PolicyError::syntax(
            expectation.to_string(),
            line,
            self.file.to_string(),
            context,
            source,
            span,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<String> {
        let mut s = Scanner::new(src, "test");
        let mut out = Vec::new();
        loop {
            let (_, tok) = s.token();
            if tok.is_empty() {
                return out;
            }
            out.push(tok.to_string());
        }
    }

    #[test]
    fn typed_names_are_single_tokens() {
        assert_eq!(
            tokens("group:g1 = host:h1, network:n1/bridge;"),
            ["group:g1", "=", "host:h1", ",", "network:n1/bridge", ";"]
        );
    }

    #[test]
    fn bracket_terminates_and_joins_words() {
        assert_eq!(
            tokens("interface:[managed & network:n1].[auto]"),
            ["interface:[", "managed", "&", "network:n1", "]", ".[", "auto", "]"]
        );
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(
            tokens("# header\nhost:h1 # trailing\n, host:h2"),
            ["host:h1", ",", "host:h2"]
        );
    }

    #[test]
    fn to_eol_captures_rest_of_line_verbatim() {
        let mut s = Scanner::new("description = free text # literal  \nnext", "test");
        let (_, tok) = s.token();
        assert_eq!(tok, "description");
        let (_, tok) = s.token();
        assert_eq!(tok, "=");
        let (_, text) = s.to_eol();
        assert_eq!(text, " free text # literal");
        let (_, tok) = s.token();
        assert_eq!(tok, "next");
    }

    #[test]
    fn error_context_marks_position_after_token() {
        let mut s = Scanner::new("foo:x =", "file");
        s.token();
        let err = s.syntax_err("Unknown global definition");
        assert_eq!(
            err.to_string(),
            "Syntax error: Unknown global definition at line 1 of file, \
             near \"foo:x<--HERE--> =\""
        );
    }

    #[test]
    fn context_prefix_cut_lands_on_char_boundary() {
        let src = format!("é{}:x =", "a".repeat(37));
        let mut s = Scanner::new(&src, "f");
        s.token();
        let msg = s.syntax_err("Unknown global definition").to_string();
        assert!(msg.contains("<--HERE--> ="));
        assert!(!msg.contains('é'));
    }

    #[test]
    fn context_suffix_cut_lands_on_char_boundary() {
        let src = format!("x {}é tail", "a".repeat(38));
        let mut s = Scanner::new(&src, "f");
        s.token();
        let msg = s.syntax_err("Expected ';'").to_string();
        assert!(msg.contains("x<--HERE-->"));
        assert!(!msg.contains('é'));
    }

    #[test]
    fn error_line_numbers_are_one_based() {
        let mut s = Scanner::new("group:g1 =\n;\nbad token", "f");
        loop {
            let (_, tok) = s.token();
            if tok == "bad" {
                break;
            }
        }
        let err = s.syntax_err("Typed name expected");
        assert!(err.to_string().contains("at line 3 of f"));
    }
}
