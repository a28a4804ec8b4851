//! External collaborator settings: conferencing service and membership store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Conferencing service credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSettings {
    /// API key; becomes the token issuer.
    pub api_key: String,
    /// API secret used to sign tokens.
    pub api_secret: String,
    /// Service URL returned to clients alongside tokens.
    pub url: String,
    /// Token lifetime in seconds, at most [`MediaSettings::MAX_TOKEN_TTL_SECS`].
    pub token_ttl_secs: u64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            url: String::new(),
            token_ttl_secs: 600,
        }
    }
}

impl MediaSettings {
    /// Longest grant lifetime the broker will stamp.
    pub const MAX_TOKEN_TTL_SECS: u64 = 600;

    /// Whether enough is configured to sign tokens.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Where community membership lists come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipSource {
    /// The inline `communities` map.
    #[default]
    Static,
    /// A PostgREST-style HTTP table.
    Rest,
}

/// Community membership source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MembershipSettings {
    /// Which source to query.
    pub source: MembershipSource,
    /// Community id → member user ids (static source).
    pub communities: BTreeMap<String, Vec<String>>,
    /// Base URL of the REST data store (rest source).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_url: Option<String>,
    /// API key sent as `apikey` and bearer token (rest source).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_api_key: Option<String>,
}
