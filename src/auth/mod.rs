//! Credential store consumed by the login and registration pages.
//!
//! The HTTP layer only sees the [`CredentialStore`] trait, reached through a
//! bounded [`CredentialPool`] of handles. Implementations are shared by
//! every worker thread, so each one owns its locking: a lookup or a
//! check-and-insert must be atomic with respect to concurrent callers.

pub mod form;
pub mod lease;
pub mod store;

pub use form::CredentialForm;
pub use lease::{Checkout, CredentialPool, LeasePool};
pub use store::{CredentialStore, MemoryStore, StoreError};
