//! Domain event definitions

use serde::{Deserialize, Serialize};

use crate::types::{ButtonId, ButtonState};

/// Semantic event recognized in one line of worker output.
///
/// Produced by [`crate::classifier::classify`], consumed immediately by the
/// state store. A line that matches nothing yields no event at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LogEvent {
    /// Battery percentage, always within `0..=100`
    BatteryReading(u8),

    /// A button went down or up
    ButtonChanged(ButtonId, ButtonState),

    /// Controller connected, with its MAC address
    DeviceConnected(String),

    /// Controller link lost
    DeviceDisconnected,
}

impl LogEvent {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            LogEvent::BatteryReading(level) => format!("Battery: {}%", level),
            LogEvent::ButtonChanged(id, state) => {
                let name = match id {
                    ButtonId::A => "Plus",
                    ButtonId::B => "Minus",
                };
                let state = match state {
                    ButtonState::Pressed => "pressed",
                    ButtonState::Released => "released",
                };
                format!("{} button {}", name, state)
            }
            LogEvent::DeviceConnected(address) => format!("Connected to {}", address),
            LogEvent::DeviceDisconnected => "Disconnected".to_string(),
        }
    }
}
