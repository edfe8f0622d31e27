// Auth module - Shared credential pair and its persistence
mod credentials;
mod storage;

pub use credentials::{CredentialPair, CredentialStore};
pub use storage::{FileStorage, MemoryStorage, TokenStorage};
