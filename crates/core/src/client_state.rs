//! Versioned client-local chat state.
//!
//! The widget persists one JSON record (under a single storage key) so that a
//! page reload resumes free-form chat instead of re-running the questionnaire.
//! The record carries an explicit schema version; loading migrates known old
//! shapes forward and falls back to a fresh record for anything unrecognized.

use serde::{Deserialize, Serialize};

pub const CLIENT_STATE_VERSION: u32 = 1;

/// Storage key the widget uses for the record.
pub const CLIENT_STATE_KEY: &str = "parley.chat.state";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStateRecord {
    pub version: u32,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "questionnaireComplete", default)]
    pub questionnaire_complete: bool,
}

impl ClientStateRecord {
    pub fn fresh(session_id: impl Into<String>) -> Self {
        Self {
            version: CLIENT_STATE_VERSION,
            session_id: session_id.into(),
            token: None,
            questionnaire_complete: false,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Restored {
    /// A usable record; `migrated` is true when it came from an older shape.
    Record { record: ClientStateRecord, migrated: bool },
    /// Nothing usable was stored; the caller starts the protocol from scratch.
    Fresh,
}

/// Legacy shape: the widget's original ad hoc keys folded into one object,
/// with no version field.
#[derive(Debug, Deserialize)]
struct LegacyClientState {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "chatToken", default)]
    chat_token: Option<String>,
    #[serde(rename = "questionnaireDone", default)]
    questionnaire_done: bool,
}

/// Decode a stored record, migrating old shapes forward.
///
/// Unknown versions and parse failures yield `Fresh` rather than an error: a
/// stale record must never wedge the widget.
pub fn decode(raw: &str) -> Restored {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Restored::Fresh;
    };

    match value.get("version").and_then(serde_json::Value::as_u64) {
        Some(version) if version == u64::from(CLIENT_STATE_VERSION) => {
            match serde_json::from_value::<ClientStateRecord>(value) {
                Ok(record) if !record.session_id.is_empty() => {
                    Restored::Record { record, migrated: false }
                }
                _ => Restored::Fresh,
            }
        }
        Some(_) => Restored::Fresh,
        None => migrate_legacy(value),
    }
}

fn migrate_legacy(value: serde_json::Value) -> Restored {
    match serde_json::from_value::<LegacyClientState>(value) {
        Ok(legacy) if !legacy.session_id.is_empty() => Restored::Record {
            record: ClientStateRecord {
                version: CLIENT_STATE_VERSION,
                session_id: legacy.session_id,
                token: legacy.chat_token,
                questionnaire_complete: legacy.questionnaire_done,
            },
            migrated: true,
        },
        _ => Restored::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, ClientStateRecord, Restored, CLIENT_STATE_VERSION};

    #[test]
    fn current_version_round_trips() {
        let record = ClientStateRecord {
            version: CLIENT_STATE_VERSION,
            session_id: "sess-1".to_string(),
            token: Some("abc.def".to_string()),
            questionnaire_complete: true,
        };
        assert_eq!(decode(&record.encode()), Restored::Record { record, migrated: false });
    }

    #[test]
    fn legacy_unversioned_shape_is_migrated() {
        let raw = r#"{"sessionId":"sess-old","chatToken":"tok.123","questionnaireDone":true}"#;
        let Restored::Record { record, migrated } = decode(raw) else {
            panic!("legacy record should migrate");
        };
        assert!(migrated);
        assert_eq!(record.version, CLIENT_STATE_VERSION);
        assert_eq!(record.session_id, "sess-old");
        assert_eq!(record.token.as_deref(), Some("tok.123"));
        assert!(record.questionnaire_complete);
    }

    #[test]
    fn unknown_future_version_starts_fresh() {
        let raw = r#"{"version":99,"sessionId":"sess-2","token":null}"#;
        assert_eq!(decode(raw), Restored::Fresh);
    }

    #[test]
    fn garbage_and_empty_session_start_fresh() {
        assert_eq!(decode("not json at all"), Restored::Fresh);
        assert_eq!(decode("[1,2,3]"), Restored::Fresh);
        assert_eq!(decode(r#"{"version":1,"sessionId":""}"#), Restored::Fresh);
        assert_eq!(decode(r#"{"chatToken":"tok"}"#), Restored::Fresh);
    }

    #[test]
    fn fresh_record_has_current_version_and_no_token() {
        let record = ClientStateRecord::fresh("sess-3");
        assert_eq!(record.version, CLIENT_STATE_VERSION);
        assert_eq!(record.token, None);
        assert!(!record.questionnaire_complete);
    }
}
