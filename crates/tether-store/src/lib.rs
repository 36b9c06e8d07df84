//! # tether-store
//!
//! Local persistence for tether.
//!
//! - [`MemoryStore`], [`FileStore`], [`VaultStore`]: key-value backends.
//!   The vault store is the "secure" flavour (Argon2id + AES-256-GCM at rest)
//!   and holds only the keypair and the session token.
//! - [`KeyStore`]: the single device keypair.
//! - [`SessionStore`]: the backend session.
//! - [`onboarding`]: signup and restore flows.

pub mod file;
pub mod key_store;
pub mod memory;
pub mod onboarding;
pub mod session;
pub mod vault_store;

pub use file::FileStore;
pub use key_store::{EnsuredKeypair, KeyStore, RegenerationConsent};
pub use memory::MemoryStore;
pub use onboarding::{
    restore_account, Acknowledgement, Onboarding, OnboardingError, OnboardingState,
};
pub use session::SessionStore;
pub use vault_store::VaultStore;
