//! Sentinel-marker framing for session output streams
//!
//! The session shell has no inherent message framing, so each invocation
//! appends a unique marker to both streams and this scanner detects it. The
//! scanner is an explicit two-state machine (`AwaitMarker` then `Done`) fed
//! one line at a time, kept free of any process I/O so the framing can be
//! tested in isolation.

/// Scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Still accumulating output, marker not yet seen
    AwaitMarker,
    /// Marker observed, no further input accepted
    Done,
}

/// Accumulates stream output until the sentinel marker is observed.
///
/// For the stdout stream the marker is immediately followed by the wrapped
/// command's exit code, which the scanner parses out. For stderr the marker
/// appears bare and only bounds capture.
#[derive(Debug)]
pub struct MarkerScanner {
    marker: String,
    state: ScanState,
    output: String,
    exit_code: Option<i32>,
}

impl MarkerScanner {
    /// Create a scanner for one invocation's marker.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            state: ScanState::AwaitMarker,
            output: String::new(),
            exit_code: None,
        }
    }

    /// Feed one line (without trailing newline). Returns `true` once the
    /// marker has been observed; content before the marker on the same line
    /// is kept, the marker itself and anything after it is discarded.
    pub fn feed_line(&mut self, line: &str) -> bool {
        if self.state == ScanState::Done {
            return true;
        }

        match line.find(&self.marker) {
            Some(pos) => {
                let before = &line[..pos];
                if !before.is_empty() {
                    self.output.push_str(before);
                    self.output.push('\n');
                }
                let after = &line[pos + self.marker.len()..];
                self.exit_code = parse_exit_code(after);
                self.state = ScanState::Done;
                true
            }
            None => {
                self.output.push_str(line);
                self.output.push('\n');
                false
            }
        }
    }

    /// Whether the marker has been observed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// Exit code parsed from the characters following the marker, if any.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Consume the scanner, returning accumulated output with trailing
    /// newlines trimmed. Never contains the marker.
    #[must_use]
    pub fn into_output(self) -> String {
        let trimmed = self.output.trim_end_matches('\n');
        trimmed.to_string()
    }
}

fn parse_exit_code(after_marker: &str) -> Option<i32> {
    let digits = after_marker.trim();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i32>().ok()
}
