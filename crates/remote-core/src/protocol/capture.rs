//! Decoders for capture-channel bodies.
//!
//! A learn session listens on exactly one of three channels:
//!
//! | Channel              | Body                                                    | Decoder                   |
//! |----------------------|---------------------------------------------------------|---------------------------|
//! | Broker result topic  | `{"IrReceived": {...}}`, `{"IrHVAC": {...}}`, `{"RfReceived": {...}}` | [`decode_broker_capture`] |
//! | Firmware learn event | `{"code": "308,166,...", "command_type": "ir"}`         | [`decode_firmware_event`] |
//! | Entity-state change  | `{"old_state": "...", "new_state": "308,166,..."}`      | [`decode_status_change`]  |
//!
//! Every decoder returns `None` for a body that is malformed or does not match
//! the session's command type.  A `None` simply means "keep waiting"; nothing
//! here ever fails a session.

use serde_json::{Map, Value};

use crate::domain::command::CommandType;
use crate::domain::library::LearnedCode;

/// Separator present in every raw timing sequence.
pub const RAW_CODE_DELIMITER: char = ',';

/// Fields in a broker result body that carry a captured signal.
fn capture_fields(command_type: CommandType) -> &'static [&'static str] {
    match command_type {
        CommandType::Ir => &["IrReceived", "IrHVAC"],
        CommandType::Rf => &["RfReceived"],
    }
}

/// Decodes a message from the broker result topic.
///
/// Messages without a field matching `command_type` (command acknowledgements,
/// the other signal family, telemetry) are ignored.
pub fn decode_broker_capture(body: &str, command_type: CommandType) -> Option<LearnedCode> {
    let Value::Object(message) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };

    capture_fields(command_type).iter().find_map(|field| {
        match field_ignore_case(&message, field)? {
            Value::Object(record) if !record.is_empty() => {
                Some(LearnedCode::Structured(record.clone()))
            }
            _ => None,
        }
    })
}

/// Decodes a firmware "code learned" event.
///
/// An event that names a different command type is ignored; an event that
/// names none is accepted, because the event type itself is already scoped to
/// one command family.
pub fn decode_firmware_event(body: &str, command_type: CommandType) -> Option<LearnedCode> {
    let Value::Object(event) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };

    if let Some(Value::String(kind)) = field_ignore_case(&event, "command_type") {
        if kind.parse::<CommandType>().ok()? != command_type {
            return None;
        }
    }

    let Value::String(code) = field_ignore_case(&event, "code")? else {
        return None;
    };
    let code = normalize_raw_code(code);
    (!code.is_empty()).then_some(LearnedCode::Raw(code))
}

/// Decodes a status-entity state change.
///
/// Accepted only when the value actually changed, is a real reading (not
/// `unknown`/`unavailable`), and looks like a raw timing sequence.
pub fn decode_status_change(body: &str) -> Option<LearnedCode> {
    let Value::Object(change) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };

    let Value::String(new_state) = field_ignore_case(&change, "new_state")? else {
        return None;
    };
    let old_state = match field_ignore_case(&change, "old_state") {
        Some(Value::String(old)) => Some(old.as_str()),
        _ => None,
    };

    if old_state == Some(new_state.as_str()) {
        return None;
    }
    if matches!(new_state.trim(), "unknown" | "unavailable" | "") {
        return None;
    }
    if !new_state.contains(RAW_CODE_DELIMITER) {
        return None;
    }

    Some(LearnedCode::Raw(normalize_raw_code(new_state)))
}

/// Cleans up a raw captured code.
///
/// Trims surrounding whitespace and any trailing non-ASCII or control
/// characters that some firmware builds append as a terminator.
pub fn normalize_raw_code(code: &str) -> String {
    code.trim()
        .trim_end_matches(|c: char| !c.is_ascii() || c.is_ascii_control())
        .trim_end()
        .to_string()
}

fn field_ignore_case<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Broker result topic ───────────────────────────────────────────────────

    #[test]
    fn test_broker_ir_received_resolves_ir_session() {
        let body = r#"{"IrReceived":{"Protocol":"NEC","Bits":32,"Data":"0x20DF10EF"}}"#;

        let code = decode_broker_capture(body, CommandType::Ir).expect("matching body");

        assert_eq!(
            code.to_payload(),
            json!({"Protocol":"NEC","Bits":32,"Data":"0x20DF10EF"}).to_string()
        );
    }

    #[test]
    fn test_broker_ir_hvac_resolves_ir_session() {
        let body = r#"{"IrHVAC":{"Vendor":"DAIKIN","Mode":"Cool","Power":"On","Temp":22}}"#;
        assert!(decode_broker_capture(body, CommandType::Ir).is_some());
    }

    #[test]
    fn test_broker_rf_received_resolves_only_rf_session() {
        let body = r#"{"RfReceived":{"Data":"0xE5CFD2","Bits":24,"Protocol":1,"Pulse":351}}"#;

        assert!(decode_broker_capture(body, CommandType::Rf).is_some());
        assert_eq!(decode_broker_capture(body, CommandType::Ir), None);
    }

    #[test]
    fn test_broker_command_acknowledgement_is_ignored() {
        assert_eq!(
            decode_broker_capture(r#"{"IRSend":"Done"}"#, CommandType::Ir),
            None
        );
    }

    #[test]
    fn test_broker_malformed_body_is_ignored() {
        assert_eq!(decode_broker_capture("{IrReceived", CommandType::Ir), None);
        assert_eq!(decode_broker_capture("42", CommandType::Ir), None);
        assert_eq!(
            decode_broker_capture(r#"{"IrReceived":"not-an-object"}"#, CommandType::Ir),
            None
        );
    }

    // ── Firmware learn event ──────────────────────────────────────────────────

    #[test]
    fn test_firmware_event_with_code_resolves() {
        let code = decode_firmware_event(r#"{"code":"308,166,20"}"#, CommandType::Ir);
        assert_eq!(code, Some(LearnedCode::Raw("308,166,20".into())));
    }

    #[test]
    fn test_firmware_event_for_other_command_type_is_ignored() {
        let body = r#"{"code":"1,2,3","command_type":"rf"}"#;
        assert_eq!(decode_firmware_event(body, CommandType::Ir), None);
        assert!(decode_firmware_event(body, CommandType::Rf).is_some());
    }

    #[test]
    fn test_firmware_event_without_code_is_ignored() {
        assert_eq!(decode_firmware_event(r#"{"other":1}"#, CommandType::Ir), None);
        assert_eq!(decode_firmware_event(r#"{"code":"   "}"#, CommandType::Ir), None);
        assert_eq!(decode_firmware_event("garbage", CommandType::Ir), None);
    }

    // ── Status entity change ──────────────────────────────────────────────────

    #[test]
    fn test_status_change_to_new_code_resolves() {
        let body = r#"{"old_state":"unknown","new_state":"308,166,20,62"}"#;
        assert_eq!(
            decode_status_change(body),
            Some(LearnedCode::Raw("308,166,20,62".into()))
        );
    }

    #[test]
    fn test_status_change_without_delimiter_is_ignored() {
        assert_eq!(
            decode_status_change(r#"{"old_state":"a","new_state":"idle"}"#),
            None
        );
    }

    #[test]
    fn test_status_unchanged_value_is_ignored() {
        assert_eq!(
            decode_status_change(r#"{"old_state":"1,2","new_state":"1,2"}"#),
            None
        );
    }

    #[test]
    fn test_status_unavailable_is_ignored() {
        assert_eq!(
            decode_status_change(r#"{"old_state":"1,2","new_state":"unavailable"}"#),
            None
        );
    }

    // ── Normalisation ─────────────────────────────────────────────────────────

    #[test]
    fn test_normalize_strips_trailing_non_ascii_terminator() {
        assert_eq!(normalize_raw_code("308,166,...ः"), "308,166,...");
    }

    #[test]
    fn test_normalize_strips_whitespace_and_control_chars() {
        assert_eq!(normalize_raw_code("  1,2,3\r\n\0"), "1,2,3");
    }

    #[test]
    fn test_normalize_keeps_clean_code_unchanged() {
        assert_eq!(normalize_raw_code("1,-2,3"), "1,-2,3");
    }
}
