use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetireReason {
    Rotated,
    Consumed,
}

impl RetireReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetireReason::Rotated => "rotated",
            RetireReason::Consumed => "consumed",
        }
    }
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret that may no longer be redeemed. Only its digest is stored.
#[derive(Debug, Clone, FromRow)]
pub struct NonceLedgerEntry {
    pub pass_id: String,
    pub nonce_hash: String,
    pub reason: String,
    pub retired_at: DateTime<Utc>,
}

impl NonceLedgerEntry {
    pub fn reason(&self) -> Option<RetireReason> {
        match self.reason.as_str() {
            "rotated" => Some(RetireReason::Rotated),
            "consumed" => Some(RetireReason::Consumed),
            _ => None,
        }
    }
}
