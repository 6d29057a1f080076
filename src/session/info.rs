//! OIDC session record and its opaque session-id encoding.
//!
//! Session id format: `base64(base64(config_id):base64(iss):base64(sub):base64(sid):timestamp)`
//!
//! The timestamp is kept as a literal decimal string inside the outer
//! encoding. A missing `sid` is encoded as an empty segment.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use std::hash::{Hash, Hasher};

const DELIMITER: char = ':';
const PART_COUNT: usize = 5;

/// One authenticated OIDC session as tracked by the relying party.
///
/// Equality and hashing ignore `session_id`: two records with the same
/// logical fields are the same session no matter how the id string was
/// produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    session_id: String,
    config_id: String,
    iss: String,
    sub: String,
    sid: String,
    timestamp: String,
}

impl SessionInfo {
    pub fn new(
        config_id: impl Into<String>,
        iss: impl Into<String>,
        sub: impl Into<String>,
        sid: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        let config_id = config_id.into();
        let iss = iss.into();
        let sub = sub.into();
        let sid = sid.into();
        let timestamp = timestamp.into();
        let session_id = encode_session_id(&config_id, &iss, &sub, &sid, &timestamp);
        Self {
            session_id,
            config_id,
            iss,
            sub,
            sid,
            timestamp,
        }
    }

    /// Decode an encoded session id.
    ///
    /// Returns `None` for empty input, invalid base64, non-UTF-8 content, or
    /// anything other than exactly five `:`-separated parts.
    pub fn from_session_id(encoded: &str) -> Option<Self> {
        if encoded.is_empty() {
            return None;
        }

        let joined = decode_segment(encoded)?;
        let parts: Vec<&str> = joined.split(DELIMITER).collect();
        if parts.len() != PART_COUNT {
            return None;
        }

        Some(Self::new(
            decode_segment(parts[0])?,
            decode_segment(parts[1])?,
            decode_segment(parts[2])?,
            decode_segment(parts[3])?,
            parts[4],
        ))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn iss(&self) -> &str {
        &self.iss
    }

    pub fn sub(&self) -> &str {
        &self.sub
    }

    /// Session id claim from the OP, or `""` when the OP did not send one.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl PartialEq for SessionInfo {
    fn eq(&self, other: &Self) -> bool {
        self.config_id == other.config_id
            && self.iss == other.iss
            && self.sid == other.sid
            && self.sub == other.sub
            && self.timestamp == other.timestamp
    }
}

impl Eq for SessionInfo {}

impl Hash for SessionInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.config_id.hash(state);
        self.iss.hash(state);
        self.sid.hash(state);
        self.sub.hash(state);
        self.timestamp.hash(state);
    }
}

impl std::fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.session_id)
    }
}

fn encode_session_id(config_id: &str, iss: &str, sub: &str, sid: &str, timestamp: &str) -> String {
    let joined = [
        STANDARD.encode(config_id),
        STANDARD.encode(iss),
        STANDARD.encode(sub),
        STANDARD.encode(sid),
        timestamp.to_string(),
    ]
    .join(&DELIMITER.to_string());
    STANDARD.encode(joined)
}

fn decode_segment(segment: &str) -> Option<String> {
    let bytes = STANDARD.decode(segment).ok()?;
    String::from_utf8(bytes).ok()
}
