//! Credential lifecycle for the Parley chat session.
//!
//! Two layers live here. [`CredentialStore`] persists the access/refresh
//! pair so a restarted process resumes the same session. [`SessionAuthority`]
//! owns the live credential: it schedules a single refresh ahead of expiry,
//! performs refresh-or-logout, and publishes the authenticated identity on
//! a watch channel that the connection layer observes.

mod authority;
mod credential;
mod error;
mod store;

pub use authority::{AuthorityConfig, SessionAuthority};
pub use credential::Credential;
pub use error::{AuthError, Result};
pub use store::{
    CREDENTIAL_FILE, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    SharedCredentialStore, create_file_store, create_memory_store,
};
