//! User profile provider seam
//!
//! Profile and chart retrieval is an external collaborator; the relay only
//! needs an optional JSON payload to enrich the generation prompt. Fetch
//! failures are non-fatal: regeneration proceeds without profile context.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Opaque profile payload passed through to the prompt
#[derive(Debug, Clone)]
pub struct ProfileContext {
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
#[error("profile fetch failed: {0}")]
pub struct ProfileError(pub String);

#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Fetch the profile for a user; Ok(None) when no profile exists
    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileContext>, ProfileError>;
}

/// Stands in when profile credentials are absent
pub struct NoopProfileProvider;

#[async_trait]
impl ProfileProvider for NoopProfileProvider {
    async fn fetch(&self, _user_id: &str) -> Result<Option<ProfileContext>, ProfileError> {
        Ok(None)
    }
}

/// Resolve profile context for a regeneration, absorbing failures
pub async fn resolve(provider: Option<&dyn ProfileProvider>, user_id: &str) -> Option<ProfileContext> {
    let provider = provider?;
    match provider.fetch(user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(%user_id, error = %e, "profile fetch failed, continuing without profile");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl ProfileProvider for FailingProvider {
        async fn fetch(&self, _user_id: &str) -> Result<Option<ProfileContext>, ProfileError> {
            Err(ProfileError("backend down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_resolve_absorbs_failure() {
        assert!(resolve(Some(&FailingProvider), "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_provider() {
        assert!(resolve(None, "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_noop_provider() {
        assert!(NoopProfileProvider.fetch("u1").await.unwrap().is_none());
    }
}
