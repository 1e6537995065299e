//! Journal record codec
//!
//! Line format used by the file backend:
//!
//! ```text
//! sequence \t event_type \t key \t value \n
//! ```
//!
//! `event_type` is 1 for Delete and 2 for Put. Key and value are arbitrary
//! user data, so both are percent-encoded: control characters (tab, newline,
//! carriage return), `%` and space are escaped.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{KvError, Result};
use crate::journal::{Event, EventType};

/// Field delimiter
pub const FIELD_SEPARATOR: char = '\t';

/// Characters escaped in the key and value fields
const FIELD_ESCAPE: &AsciiSet = &CONTROLS.add(b'%').add(b' ');

/// Encode an event as one journal line (newline included)
pub fn encode_record(event: &Event) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}\n",
        event.sequence,
        event.event_type.code(),
        utf8_percent_encode(&event.key, FIELD_ESCAPE),
        utf8_percent_encode(&event.value, FIELD_ESCAPE),
        sep = FIELD_SEPARATOR,
    )
}

/// Decode one journal line (without its trailing newline)
///
/// `line_no` is 1-based and only used in error messages.
pub fn decode_record(line: &str, line_no: usize) -> Result<Event> {
    let location = format!("line {}", line_no);
    let corrupt = |reason: String| KvError::corrupt(location.clone(), reason);

    let mut fields = line.splitn(4, FIELD_SEPARATOR);
    let (sequence, event_type, key, value) =
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(s), Some(t), Some(k), Some(v)) => (s, t, k, v),
            _ => return Err(corrupt("expected 4 tab-separated fields".to_string())),
        };

    let sequence: u64 = sequence
        .parse()
        .map_err(|e| corrupt(format!("invalid sequence {:?}: {}", sequence, e)))?;

    let code: u8 = event_type
        .parse()
        .map_err(|e| corrupt(format!("invalid event type {:?}: {}", event_type, e)))?;
    let event_type = EventType::try_from(code)
        .map_err(|_| corrupt(format!("unknown event type code {}", code)))?;

    let key = decode_field(key).map_err(|reason| corrupt(format!("key: {}", reason)))?;
    if key.is_empty() {
        return Err(corrupt("empty key".to_string()));
    }
    let value = decode_field(value).map_err(|reason| corrupt(format!("value: {}", reason)))?;

    Ok(Event {
        sequence,
        event_type,
        key,
        value,
    })
}

fn decode_field(raw: &str) -> std::result::Result<String, String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| format!("invalid percent-encoded UTF-8: {}", e))
}
