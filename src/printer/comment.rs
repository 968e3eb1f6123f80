//! Comment recovery from the original source.
//!
//! The tree carries no comment text, only byte spans. Pre-comments are
//! whole-line comments sitting strictly between the previous construct and
//! a node's start; trailing comments share the node's line, reachable from
//! its end across whitespace and a caller-given separator set. Whatever
//! attaches to no node is flushed verbatim at the end of the output.

use crate::ast::{Node, Span, Toplevel};

use super::Printer;

enum PreLine {
    Blank,
    Comment(String),
}

/// Strip leading whitespace and separator characters.
fn strip_ignored<'a>(line: &'a str, ign: &str) -> &'a str {
    line.trim_start_matches(|c: char| c.is_ascii_whitespace() || ign.contains(c))
}

impl Printer {
    /// Emit the node's pre-comments at the current indentation, keeping one
    /// blank line between comment paragraphs (runs of blanks collapse).
    pub(super) fn pre_comment(&mut self, span: Span, ign: &str) {
        for line in self.collect_pre(span.start, ign) {
            match line {
                PreLine::Blank => self.empty_line(),
                PreLine::Comment(text) => self.print(&text),
            }
        }
    }

    fn collect_pre(&self, pos: usize, ign: &str) -> Vec<PreLine> {
        let pos = pos.min(self.src.len());
        let line_start = self.src[..pos].rfind('\n').map_or(0, |i| i + 1);

        // A node preceded by code on its own line has no comment lines of
        // its own; everything above belongs to an earlier construct.
        if !strip_ignored(&self.src[line_start..pos], ign).is_empty() {
            return Vec::new();
        }

        let mut collected = Vec::new();
        let mut idx = line_start;
        while idx > 0 {
            let prev_start = self.src[..idx - 1].rfind('\n').map_or(0, |i| i + 1);
            let line = self.src[prev_start..idx - 1].trim_end();
            if line.trim().is_empty() {
                collected.push(PreLine::Blank);
            } else {
                let stripped = strip_ignored(line, ign);
                if stripped.starts_with('#') {
                    collected.push(PreLine::Comment(stripped.to_string()));
                } else {
                    break;
                }
            }
            idx = prev_start;
        }
        collected.reverse();
        collected
    }

    /// A comment on the same line as the node's end, reachable across
    /// whitespace and `ign` separators. Returned with a leading space,
    /// ready to append to the node's own output line.
    pub(super) fn trailing_comment(&self, span: Span, ign: &str) -> String {
        self.trailing_comment_at(span.end, ign)
    }

    pub(super) fn trailing_comment_at(&self, pos: usize, ign: &str) -> String {
        let bytes = self.src.as_bytes();
        let mut i = pos.min(bytes.len());
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\n' {
                break;
            }
            if b == b'#' {
                let end = self.src[i..]
                    .find('\n')
                    .map_or(self.src.len(), |j| i + j);
                return format!(" {}", self.src[i..end].trim_end());
            }
            if b == b' ' || b == b'\t' || ign.contains(b as char) {
                i += 1;
                continue;
            }
            break;
        }
        String::new()
    }

    /// Flush comments left after the final construct so none are dropped.
    /// For a file without definitions this reproduces every standalone
    /// comment line.
    pub(super) fn flush_tail(&mut self, list: &[Toplevel]) {
        let mut idx = match list.last() {
            Some(last) => {
                // The remainder of the final line was already captured as a
                // trailing comment of the last printed node.
                let end = last.span().end.min(self.src.len());
                match self.src[end..].find('\n') {
                    Some(i) => end + i + 1,
                    None => return,
                }
            }
            None => 0,
        };
        let mut pending_blank = false;
        while idx < self.src.len() {
            let line_end = self.src[idx..]
                .find('\n')
                .map_or(self.src.len(), |i| idx + i);
            let line = self.src[idx..line_end].trim().to_string();
            if line.is_empty() {
                pending_blank = true;
            } else if line.starts_with('#') {
                if pending_blank {
                    self.empty_line();
                    pending_blank = false;
                }
                self.print(&line);
            }
            idx = line_end + 1;
        }
    }
}
