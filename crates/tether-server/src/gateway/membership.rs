//! Community membership collaborators.
//!
//! The gateway never owns membership; it asks a [`MembershipStore`] for the
//! full member list of a community at fan-out time.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tether_core::ids::{CommunityId, UserId};
use tether_settings::MembershipSettings;
use tracing::{debug, warn};

/// Failure resolving a community's members.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// Store not configured.
    #[error("membership store not configured: {reason}")]
    NotConfigured {
        /// What is missing.
        reason: String,
    },
    /// Transport failure.
    #[error("membership query failed: {reason}")]
    Query {
        /// Underlying error.
        reason: String,
    },
    /// Non-success status from the store.
    #[error("membership store returned {status}: {body}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Response body could not be decoded.
    #[error("invalid membership response: {reason}")]
    Decode {
        /// Decoder error.
        reason: String,
    },
}

/// Source of truth for who belongs to a community.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Every member of `community`, connected or not.
    async fn members(&self, community: &CommunityId) -> Result<Vec<UserId>, MembershipError>;
}

/// Membership from an inline map, for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct StaticMembership {
    communities: BTreeMap<CommunityId, Vec<UserId>>,
}

impl StaticMembership {
    /// Build from `community id → member ids`.
    pub fn new(communities: &BTreeMap<String, Vec<String>>) -> Self {
        let communities = communities
            .iter()
            .map(|(community, members)| {
                (
                    CommunityId::new(community.as_str()),
                    members.iter().map(|m| UserId::new(m.as_str())).collect(),
                )
            })
            .collect();
        Self { communities }
    }
}

#[async_trait]
impl MembershipStore for StaticMembership {
    async fn members(&self, community: &CommunityId) -> Result<Vec<UserId>, MembershipError> {
        Ok(self.communities.get(community).cloned().unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct MemberRow {
    user_id: String,
}

/// Membership read from a PostgREST `community_members` table.
pub struct RestMembership {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestMembership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestMembership")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestMembership {
    /// Create a store against `base_url` (the data store's root URL).
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, MembershipError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MembershipError::NotConfigured {
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Create a store from settings. Fails when `restUrl` is missing.
    pub fn from_settings(
        settings: &MembershipSettings,
        timeout: Duration,
    ) -> Result<Self, MembershipError> {
        let url = settings
            .rest_url
            .as_deref()
            .ok_or_else(|| MembershipError::NotConfigured {
                reason: "membership.restUrl is not set".into(),
            })?;
        Self::new(url, settings.rest_api_key.as_deref().unwrap_or_default(), timeout)
    }
}

#[async_trait]
impl MembershipStore for RestMembership {
    async fn members(&self, community: &CommunityId) -> Result<Vec<UserId>, MembershipError> {
        let url = format!("{}/rest/v1/community_members", self.base_url);
        let filter = format!("eq.{community}");
        let response = self
            .client
            .get(&url)
            .query(&[("select", "user_id"), ("community_id", filter.as_str())])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, community_id = %community, "membership query failed");
                MembershipError::Query {
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "membership store error");
            return Err(MembershipError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<MemberRow> = response.json().await.map_err(|e| MembershipError::Decode {
            reason: e.to_string(),
        })?;
        debug!(community_id = %community, members = rows.len(), "membership resolved");
        Ok(rows.into_iter().map(|r| UserId::new(r.user_id)).collect())
    }
}
