use std::collections::HashMap;

use async_trait::async_trait;

/// Seam to the identity collaborator: maps an authenticated actor id to the
/// name of its access profile. The engine never authenticates; it only
/// authorizes against the profile the provider hands back.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the actor exists nowhere the provider knows about.
    /// An `Err` is a provider outage; both fail the call closed.
    async fn profile_name(&self, actor_id: &str) -> Result<Option<String>, String>;
}

/// Static directory for tests and single-tenant deployments.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIdentityProvider {
    profiles_by_actor: HashMap<String, String>,
}

impl InMemoryIdentityProvider {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { profiles_by_actor: entries.into_iter().collect() }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>, profile: impl Into<String>) -> Self {
        self.profiles_by_actor.insert(actor_id.into(), profile.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn profile_name(&self, actor_id: &str) -> Result<Option<String>, String> {
        Ok(self.profiles_by_actor.get(actor_id).cloned())
    }
}
