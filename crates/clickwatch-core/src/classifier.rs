//! Line classifier for the bridge script's output
//!
//! The worker has no structured protocol: it prints human-readable log lines
//! and a handful of them carry state. Each line is checked against [`RULES`]
//! in order and the **first rule whose marker appears wins**. Later rules are
//! never consulted for that line, even if the winning rule's payload turns
//! out to be malformed. A battery line that also says "Disconnected"
//! therefore never disconnects anything.
//!
//! ```
//! use clickwatch_core::{classify, LogEvent};
//!
//! assert_eq!(
//!     classify("Current battery level is 57 app.py"),
//!     Some(LogEvent::BatteryReading(57))
//! );
//! assert_eq!(classify("Scanning for devices..."), None);
//! ```

use thiserror::Error;

use crate::ansi::strip_ansi_codes;
use crate::events::LogEvent;
use crate::types::{ButtonId, ButtonState};

// ─────────────────────────────────────────────────────────
// Markers
// ─────────────────────────────────────────────────────────

pub const BATTERY_MARKER: &str = "Current battery level is";
/// Ends the battery payload. Optional: without it the payload runs to end of line.
pub const BATTERY_TERMINATOR: &str = "app.py";
pub const PLUS_PRESSED_MARKER: &str = "Plus button PRESSED";
pub const PLUS_RELEASED_MARKER: &str = "Plus button RELEASED";
pub const MINUS_PRESSED_MARKER: &str = "Minus button PRESSED";
pub const MINUS_RELEASED_MARKER: &str = "Minus button RELEASED";
pub const ADDRESS_MARKER: &str = "Using MAC of \"";
pub const ADDRESS_DELIMITER: char = '"';
pub const DISCONNECTED_MARKER: &str = "Disconnected";

/// Highest battery percentage accepted
pub const MAX_BATTERY_LEVEL: i64 = 100;

// ─────────────────────────────────────────────────────────
// Rule Table
// ─────────────────────────────────────────────────────────

/// Which rule recognized a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Battery,
    PlusPressed,
    PlusReleased,
    MinusPressed,
    MinusReleased,
    DeviceAddress,
    Disconnected,
}

/// Malformed payload inside a line whose marker matched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("battery payload is not an integer: {raw:?}")]
    InvalidBattery { raw: String },

    #[error("battery level {value} outside 0..=100")]
    BatteryOutOfRange { value: i64 },

    #[error("device address is missing its closing quote")]
    UnterminatedAddress,

    #[error("device address is empty")]
    EmptyAddress,
}

type Extractor = fn(&str) -> Result<LogEvent, ParseError>;

/// One entry of the priority-ordered rule table
pub struct Rule {
    pub kind: RuleKind,
    /// Literal substring that selects this rule
    pub marker: &'static str,
    /// Builds the event from the text following the marker
    extract: Extractor,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind)
            .field("marker", &self.marker)
            .finish()
    }
}

/// Classification rules in priority order. Order is part of the contract.
pub static RULES: [Rule; 7] = [
    Rule {
        kind: RuleKind::Battery,
        marker: BATTERY_MARKER,
        extract: extract_battery,
    },
    Rule {
        kind: RuleKind::PlusPressed,
        marker: PLUS_PRESSED_MARKER,
        extract: |_| Ok(LogEvent::ButtonChanged(ButtonId::A, ButtonState::Pressed)),
    },
    Rule {
        kind: RuleKind::PlusReleased,
        marker: PLUS_RELEASED_MARKER,
        extract: |_| Ok(LogEvent::ButtonChanged(ButtonId::A, ButtonState::Released)),
    },
    Rule {
        kind: RuleKind::MinusPressed,
        marker: MINUS_PRESSED_MARKER,
        extract: |_| Ok(LogEvent::ButtonChanged(ButtonId::B, ButtonState::Pressed)),
    },
    Rule {
        kind: RuleKind::MinusReleased,
        marker: MINUS_RELEASED_MARKER,
        extract: |_| Ok(LogEvent::ButtonChanged(ButtonId::B, ButtonState::Released)),
    },
    Rule {
        kind: RuleKind::DeviceAddress,
        marker: ADDRESS_MARKER,
        extract: extract_address,
    },
    Rule {
        kind: RuleKind::Disconnected,
        marker: DISCONNECTED_MARKER,
        extract: |_| Ok(LogEvent::DeviceDisconnected),
    },
];

fn extract_battery(rest: &str) -> Result<LogEvent, ParseError> {
    let payload = match rest.find(BATTERY_TERMINATOR) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let raw = payload.trim();

    let value: i64 = raw.parse().map_err(|_| ParseError::InvalidBattery {
        raw: raw.to_string(),
    })?;

    match u8::try_from(value) {
        Ok(level) if value <= MAX_BATTERY_LEVEL => Ok(LogEvent::BatteryReading(level)),
        _ => Err(ParseError::BatteryOutOfRange { value }),
    }
}

fn extract_address(rest: &str) -> Result<LogEvent, ParseError> {
    let end = rest
        .find(ADDRESS_DELIMITER)
        .ok_or(ParseError::UnterminatedAddress)?;
    let address = rest[..end].trim();

    if address.is_empty() {
        return Err(ParseError::EmptyAddress);
    }
    Ok(LogEvent::DeviceConnected(address.to_string()))
}

// ─────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────

/// Full outcome of classifying one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A rule matched and produced an event
    Event { rule: RuleKind, event: LogEvent },
    /// A rule matched but its payload was unusable; no event
    Malformed { rule: RuleKind, error: ParseError },
    /// No marker present
    Unmatched,
}

impl Classification {
    /// The rule that claimed the line, if any
    pub fn rule(&self) -> Option<RuleKind> {
        match self {
            Classification::Event { rule, .. } | Classification::Malformed { rule, .. } => {
                Some(*rule)
            }
            Classification::Unmatched => None,
        }
    }

    pub fn into_event(self) -> Option<LogEvent> {
        match self {
            Classification::Event { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Classify a line, reporting which rule matched and why a payload was rejected.
pub fn classify_detailed(line: &str) -> Classification {
    let visible = strip_ansi_codes(line);

    for rule in RULES.iter() {
        let Some(pos) = visible.find(rule.marker) else {
            continue;
        };

        let rest = &visible[pos + rule.marker.len()..];
        return match (rule.extract)(rest) {
            Ok(event) => Classification::Event {
                rule: rule.kind,
                event,
            },
            Err(error) => Classification::Malformed {
                rule: rule.kind,
                error,
            },
        };
    }

    Classification::Unmatched
}

/// Map one line of worker output to at most one event.
pub fn classify(line: &str) -> Option<LogEvent> {
    classify_detailed(line).into_event()
}
