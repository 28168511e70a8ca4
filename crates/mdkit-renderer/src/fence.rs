//! Fenced code tracking for line-based block matching.
//!
//! Block parsers only see lines outside fenced code, so `:::` inside a code
//! sample is never mistaken for a container.

/// Classification of one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    /// Ordinary markdown line.
    Text,
    /// Opening or closing fence marker.
    Fence,
    /// Line inside fenced code.
    Code,
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

/// Line-by-line fence state.
///
/// Follows `CommonMark`: a fence is three or more backticks or tildes
/// indented at most three spaces, closed by the same character repeated at
/// least as many times with nothing but whitespace after it.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<Fence>,
}

impl FenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Classify `line` and advance the state.
    pub(crate) fn observe(&mut self, line: &str) -> LineKind {
        let Some(body) = strip_indent(line) else {
            return if self.open.is_some() {
                LineKind::Code
            } else {
                LineKind::Text
            };
        };

        match self.open {
            Some(fence) => {
                let run = marker_run(body, fence.marker);
                if run >= fence.len && body[run..].trim().is_empty() {
                    self.open = None;
                    LineKind::Fence
                } else {
                    LineKind::Code
                }
            }
            None => match opening(body) {
                Some(fence) => {
                    self.open = Some(fence);
                    LineKind::Fence
                }
                None => LineKind::Text,
            },
        }
    }
}

/// Strip up to three leading spaces; `None` when indented further.
fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

fn marker_run(body: &str, marker: char) -> usize {
    body.chars().take_while(|&c| c == marker).count() * marker.len_utf8()
}

fn opening(body: &str) -> Option<Fence> {
    let marker = body.chars().next().filter(|c| matches!(c, '`' | '~'))?;
    let len = marker_run(body, marker);
    if len < 3 {
        return None;
    }
    // Backtick info strings may not contain backticks.
    if marker == '`' && body[len..].contains('`') {
        return None;
    }
    Some(Fence { marker, len })
}
