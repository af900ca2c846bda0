//! Payment provider identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// External payment provider handled by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Click.uz - web redirect gateway with prepare/complete webhooks.
    Click,
    /// Payme - receipt-based gateway, verified by polling receipt state.
    Payme,
    /// Google Play in-app billing - client-submitted purchase tokens.
    GooglePlay,
}

impl ProviderKind {
    /// Stable string form used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Click => "click",
            ProviderKind::Payme => "payme",
            ProviderKind::GooglePlay => "google_play",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click" => Ok(ProviderKind::Click),
            "payme" => Ok(ProviderKind::Payme),
            // "google" is what older mobile clients send
            "google_play" | "google" => Ok(ProviderKind::GooglePlay),
            other => Err(ValidationError::invalid_format(
                "provider",
                format!("unknown provider '{}'", other),
            )),
        }
    }
}
