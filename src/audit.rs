//! OCSF-shaped security audit events.
//!
//! Events are serialized to JSON and emitted with `tracing::info!` on the
//! `audit` target, so they can be routed separately from operational logs.

use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

// OCSF Authentication class
pub const CLASS_AUTHENTICATION: u32 = 3001;

pub const ACTIVITY_LOGON: u32 = 1;
pub const ACTIVITY_LOGOFF: u32 = 2;
pub const ACTIVITY_OTHER: u32 = 99;

pub const STATUS_SUCCESS: u32 = 1;
pub const STATUS_FAILURE: u32 = 2;

pub const SEVERITY_INFORMATIONAL: u32 = 1;
pub const SEVERITY_LOW: u32 = 2;
pub const SEVERITY_MEDIUM: u32 = 3;
pub const SEVERITY_HIGH: u32 = 4;

const AUTH_PROTOCOL_OIDC: u32 = 10;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn severity_name(id: u32) -> &'static str {
    match id {
        SEVERITY_INFORMATIONAL => "Informational",
        SEVERITY_LOW => "Low",
        SEVERITY_MEDIUM => "Medium",
        SEVERITY_HIGH => "High",
        _ => "Unknown",
    }
}

fn activity_name(id: u32) -> &'static str {
    match id {
        ACTIVITY_LOGON => "Logon",
        ACTIVITY_LOGOFF => "Logoff",
        _ => "Other",
    }
}

/// One authentication event. Optional fields are omitted when unset.
#[derive(Debug, Clone)]
pub struct AuthEvent<'a> {
    pub activity_id: u32,
    pub status_id: u32,
    pub severity_id: u32,
    pub subject: Option<&'a str>,
    pub session: Option<&'a str>,
    pub config_id: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> AuthEvent<'a> {
    pub fn new(activity_id: u32, status_id: u32, message: &'a str) -> Self {
        let severity_id = if status_id == STATUS_SUCCESS {
            SEVERITY_INFORMATIONAL
        } else {
            SEVERITY_MEDIUM
        };
        Self {
            activity_id,
            status_id,
            severity_id,
            subject: None,
            session: None,
            config_id: None,
            message,
        }
    }

    pub fn severity(mut self, severity_id: u32) -> Self {
        self.severity_id = severity_id;
        self
    }

    pub fn subject(mut self, subject: Option<&'a str>) -> Self {
        self.subject = subject;
        self
    }

    pub fn session(mut self, session_id: &'a str) -> Self {
        self.session = Some(session_id);
        self
    }

    pub fn config_id(mut self, config_id: &'a str) -> Self {
        self.config_id = Some(config_id);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut event = json!({
            "class_uid": CLASS_AUTHENTICATION,
            "class_name": "Authentication",
            "activity_id": self.activity_id,
            "activity_name": activity_name(self.activity_id),
            "severity_id": self.severity_id,
            "severity": severity_name(self.severity_id),
            "status_id": self.status_id,
            "status": if self.status_id == STATUS_SUCCESS { "Success" } else { "Failure" },
            "time": now_millis(),
            "metadata": {
                "product": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }
            },
            "auth_protocol_id": AUTH_PROTOCOL_OIDC,
            "auth_protocol": "OpenID Connect",
            "message": self.message,
        });

        if let Some(sub) = self.subject {
            event["actor"] = json!({"user": {"uid": sub, "type_id": 1, "type": "User"}});
        }
        if let Some(session) = self.session {
            event["session"] = json!({"uid": session});
        }
        if let Some(config_id) = self.config_id {
            event["metadata"]["config_id"] = json!(config_id);
        }
        event
    }

    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(&self.to_json()) {
            tracing::info!(target: "audit", "{}", json);
        }
    }
}
