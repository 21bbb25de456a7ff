//! Host credential store.
//!
//! Remote hosts register under a DNS name and authenticate with one of
//! three methods: anonymously, with a SHA-1 challenge-response password, or
//! with a client certificate chained to a per-entry CA. Credentials are
//! loaded from a tab-separated file and matched by wildcard patterns over
//! the `(hostname, suffix)` pair.
//!
//! # Example
//!
//! ```no_run
//! use vpnazure_auth::CredentialStore;
//!
//! let store = CredentialStore::new();
//! store.load("auth.txt".as_ref())?;
//! if let Some(cred) = store.find("vpn1.example.net", ".example.net") {
//!     // authenticate against `cred`
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

mod entry;
mod store;
mod wildcard;

pub use entry::{AuthMethod, Credential};
pub use store::CredentialStore;
pub use wildcard::wildcard_pattern;
