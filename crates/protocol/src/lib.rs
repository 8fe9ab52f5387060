//! Client protocol: the `{type, payload}` JSON envelope exchanged over the
//! WebSocket, inbound decoding and the outbound message set.
//!
//! Inbound frames are decoded leniently: the envelope is parsed first and the
//! payload is interpreted per type, so an unknown `type` is reported as
//! [`Inbound::Unknown`] instead of failing the whole frame.

use pm_domain::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type names used on the wire.
pub mod kind {
    pub const CONNECTED: &str = "connected";
    pub const AUTH: &str = "auth";
    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const AUTH_FAILED: &str = "auth_failed";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const BALANCE_REQUEST: &str = "balance_request";
    pub const BALANCE: &str = "balance";
    pub const BALANCE_UPDATE: &str = "balance_update";
    pub const ACCRUAL: &str = "accrual";
    pub const ERROR: &str = "error";
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw wire envelope. `payload` defaults to `null` when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound (client → server)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// In-band (re-)authentication.
    Auth { token: String },
    /// Client liveness signal. The timestamp is informational only.
    Heartbeat { timestamp: Option<i64> },
    BalanceRequest,
    /// Any other `type`; logged and ignored by the server.
    Unknown { kind: String },
}

/// Why an inbound frame could not be turned into an [`Inbound`].
///
/// The `Display` text of the auth variants is sent verbatim to the client
/// in an `auth_failed` message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid auth message format")]
    AuthFormat,
    #[error("Token is required")]
    MissingToken,
}

impl DecodeError {
    /// True for failures that should be answered with `auth_failed`.
    pub fn is_auth(&self) -> bool {
        matches!(self, DecodeError::AuthFormat | DecodeError::MissingToken)
    }
}

impl Inbound {
    pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
        let env: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(env)
    }

    pub fn from_envelope(env: Envelope) -> Result<Inbound, DecodeError> {
        match env.kind.as_str() {
            kind::AUTH => {
                let obj = env.payload.as_object().ok_or(DecodeError::AuthFormat)?;
                match obj.get("token").and_then(Value::as_str) {
                    Some(token) if !token.is_empty() => Ok(Inbound::Auth {
                        token: token.to_owned(),
                    }),
                    _ => Err(DecodeError::MissingToken),
                }
            }
            kind::HEARTBEAT => Ok(Inbound::Heartbeat {
                timestamp: env.payload.get("timestamp").and_then(Value::as_i64),
            }),
            kind::BALANCE_REQUEST => Ok(Inbound::BalanceRequest),
            _ => Ok(Inbound::Unknown { kind: env.kind }),
        }
    }

    /// Encode as a client would send it.
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Inbound::Auth { token } => {
                Envelope::new(kind::AUTH, serde_json::json!({ "token": token }))
            }
            Inbound::Heartbeat { timestamp } => Envelope::new(
                kind::HEARTBEAT,
                serde_json::json!({ "timestamp": timestamp }),
            ),
            Inbound::BalanceRequest => Envelope::new(kind::BALANCE_REQUEST, Value::Null),
            Inbound::Unknown { kind } => Envelope::new(kind.clone(), Value::Null),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound (server → client)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
    /// Handshake complete; the session is registered.
    Connected(UserPayload),
    /// In-band `auth` accepted.
    AuthSuccess(UserPayload),
    /// Handshake or in-band `auth` rejected. Payload is a human-readable reason.
    AuthFailed(String),
    /// Server liveness tick.
    Heartbeat(TimestampPayload),
    /// Reply to `balance_request`.
    Balance(BalancePayload),
    /// Unsolicited balance push.
    BalanceUpdate(BalanceUpdatePayload),
    /// Points were credited by the accrual sweep.
    Accrual(AccrualPayload),
    /// Request-level failure. Never carries internal detail.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPayload {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePayload {
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdatePayload {
    pub balance: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualPayload {
    pub points: i64,
    pub new_balance: i64,
    pub timestamp: i64,
}

impl Outbound {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Connected(_) => kind::CONNECTED,
            Outbound::AuthSuccess(_) => kind::AUTH_SUCCESS,
            Outbound::AuthFailed(_) => kind::AUTH_FAILED,
            Outbound::Heartbeat(_) => kind::HEARTBEAT,
            Outbound::Balance(_) => kind::BALANCE,
            Outbound::BalanceUpdate(_) => kind::BALANCE_UPDATE,
            Outbound::Accrual(_) => kind::ACCRUAL,
            Outbound::Error(_) => kind::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uid() -> UserId {
        "507f1f77bcf86cd799439011".parse().unwrap()
    }

    #[test]
    fn decode_auth_requires_object_with_token() {
        let ok = Inbound::decode(r#"{"type":"auth","payload":{"token":"abc"}}"#).unwrap();
        assert_eq!(ok, Inbound::Auth { token: "abc".into() });

        let err = Inbound::decode(r#"{"type":"auth","payload":"abc"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::AuthFormat));
        assert_eq!(err.to_string(), "Invalid auth message format");

        let err = Inbound::decode(r#"{"type":"auth","payload":{"token":""}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingToken));
        assert!(err.is_auth());
    }

    #[test]
    fn decode_heartbeat_tolerates_missing_payload() {
        assert_eq!(
            Inbound::decode(r#"{"type":"heartbeat"}"#).unwrap(),
            Inbound::Heartbeat { timestamp: None }
        );
        assert_eq!(
            Inbound::decode(r#"{"type":"heartbeat","payload":{"timestamp":17}}"#).unwrap(),
            Inbound::Heartbeat { timestamp: Some(17) }
        );
    }

    #[test]
    fn decode_balance_request_ignores_payload() {
        assert_eq!(
            Inbound::decode(r#"{"type":"balance_request","payload":{}}"#).unwrap(),
            Inbound::BalanceRequest
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(
            Inbound::decode(r#"{"type":"dance"}"#).unwrap(),
            Inbound::Unknown { kind: "dance".into() }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Inbound::decode("not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(!err.is_auth());
    }

    #[test]
    fn outbound_uses_type_payload_envelope() {
        let msg = Outbound::Accrual(AccrualPayload {
            points: 1,
            new_balance: 2,
            timestamp: 1_700_000_000,
        });
        let v: Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "accrual",
                "payload": { "points": 1, "new_balance": 2, "timestamp": 1_700_000_000 }
            })
        );
    }

    #[test]
    fn outbound_string_payloads() {
        let v: Value =
            serde_json::from_str(&Outbound::AuthFailed("nope".into()).to_text().unwrap()).unwrap();
        assert_eq!(v, json!({ "type": "auth_failed", "payload": "nope" }));

        let v: Value = serde_json::to_value(Outbound::Connected(UserPayload {
            user_id: uid(),
            username: "testuser@example.com".into(),
        }))
        .unwrap();
        assert_eq!(v["type"], "connected");
        assert_eq!(v["payload"]["user_id"], "507f1f77bcf86cd799439011");
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let msgs = [
            Outbound::Heartbeat(TimestampPayload { timestamp: 1 }),
            Outbound::Balance(BalancePayload { balance: 3 }),
            Outbound::BalanceUpdate(BalanceUpdatePayload { balance: 3, timestamp: 1 }),
            Outbound::Error("x".into()),
        ];
        for msg in msgs {
            let v = serde_json::to_value(&msg).unwrap();
            assert_eq!(v["type"], msg.kind());
        }
    }
}
