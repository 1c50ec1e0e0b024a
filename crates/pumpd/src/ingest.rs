//! Input lines → canonical messages.
//!
//! One announcement per line, in either generation:
//!
//!   current  — the JSON message itself
//!   legacy   — `{"topic": …, "body": "<pubTime> <baseUrl> <relPath>", "headers": {…}}`

use pump_core::message::Message;
use pump_core::translate::LegacyAnnouncement;
use pump_core::wire::{Generation, WireError};
use serde_json::Value;

/// Generation a line was written in, judged by its shape.
pub fn detect(value: &Value) -> Generation {
    match value.get("body") {
        Some(Value::String(_)) => Generation::Legacy,
        _ => Generation::Current,
    }
}

/// Decode one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<(Generation, Message)>, WireError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(line).map_err(|e| WireError::BadJson(e.to_string()))?;
    let generation = detect(&value);
    let msg = match generation {
        Generation::Legacy => {
            let legacy: LegacyAnnouncement =
                serde_json::from_value(value).map_err(|e| WireError::BadJson(e.to_string()))?;
            legacy.to_current()?
        }
        Generation::Current => Message::from_json(line)?,
    };
    Ok(Some((generation, msg)))
}
