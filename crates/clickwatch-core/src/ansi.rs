//! ANSI escape code handling
//!
//! The bridge script logs through Python's `logging`, and colored handlers
//! wrap level names and messages in SGR sequences. Markers must be matched
//! against the visible text, so escapes are removed before classification.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Regex pattern for ANSI escape sequences.
///
/// Covers:
/// - CSI sequences: ESC [ ... letter (colors, cursor, etc.)
/// - OSC sequences: ESC ] ... BEL or ST (hyperlinks, titles)
/// - Simple escapes: ESC letter
static ANSI_ESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \x1b\[[0-9;?]*[A-Za-z]               # CSI sequences
        | \x1b\][^\x07\x1b]*(?:\x07|\x1b\\)  # OSC sequences
        | \x1b[A-Za-z]                       # Simple escapes
        ",
    )
    .expect("ANSI regex pattern is valid")
});

/// Strip all ANSI escape sequences from a string.
///
/// # Examples
///
/// ```
/// use clickwatch_core::strip_ansi_codes;
///
/// let input = "\x1b[32mINFO\x1b[0m Disconnected";
/// assert_eq!(strip_ansi_codes(input), "INFO Disconnected");
/// ```
pub fn strip_ansi_codes(input: &str) -> Cow<'_, str> {
    ANSI_ESCAPE_PATTERN.replace_all(input, "")
}
