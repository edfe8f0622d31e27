use super::{MemoryStorage, TokenStorage};
use crate::types::{ACCESS_TOKEN_KEY, RENEWAL_TOKEN_KEY, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access/renewal token pair. `None` means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: Option<String>,
    #[serde(rename = "refresh_token")]
    pub renewal_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, renewal_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            renewal_token: Some(renewal_token.into()),
        }
    }
}

/// Process-wide credential holder shared by the socket client and the API client.
///
/// Cloning is cheap and every clone sees the same pair. Reads are synchronous, so a
/// caller can read the access token and attach it to a request without an await in
/// between. Writes go through to the backing [`TokenStorage`].
#[derive(Clone)]
pub struct CredentialStore {
    pair: Arc<RwLock<CredentialPair>>,
    storage: Arc<dyn TokenStorage>,
}

impl CredentialStore {
    /// An empty store backed by `storage`. Nothing is read from storage yet.
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            pair: Arc::new(RwLock::new(CredentialPair::default())),
            storage,
        }
    }

    /// A store hydrated from whatever `storage` already holds.
    pub fn load(storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let pair = CredentialPair {
            access_token: storage.get(ACCESS_TOKEN_KEY)?,
            renewal_token: storage.get(RENEWAL_TOKEN_KEY)?,
        };
        tracing::debug!(
            authenticated = pair.access_token.is_some(),
            "Loaded persisted credentials"
        );
        Ok(Self {
            pair: Arc::new(RwLock::new(pair)),
            storage,
        })
    }

    /// An empty store that persists nothing.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.pair.read().access_token.clone()
    }

    pub fn renewal_token(&self) -> Option<String> {
        self.pair.read().renewal_token.clone()
    }

    pub fn snapshot(&self) -> CredentialPair {
        self.pair.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.pair.read().access_token.is_some()
    }

    /// Replace the pair (after login or renewal) and persist it.
    pub fn store(&self, pair: CredentialPair) -> Result<()> {
        let mut current = self.pair.write();
        persist(self.storage.as_ref(), ACCESS_TOKEN_KEY, pair.access_token.as_deref())?;
        persist(self.storage.as_ref(), RENEWAL_TOKEN_KEY, pair.renewal_token.as_deref())?;
        *current = pair;
        Ok(())
    }

    /// Forget both tokens, in memory and in storage.
    pub fn clear(&self) -> Result<()> {
        let mut current = self.pair.write();
        *current = CredentialPair::default();
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(RENEWAL_TOKEN_KEY)?;
        tracing::info!("Cleared stored credentials");
        Ok(())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pair = self.pair.read();
        f.debug_struct("CredentialStore")
            .field("access_token", &pair.access_token.as_ref().map(|_| "<redacted>"))
            .field("renewal_token", &pair.renewal_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn persist(storage: &dyn TokenStorage, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) => storage.set(key, v),
        None => storage.remove(key),
    }
}
