//! Credential entry and password verification.

use std::fmt;

use regex::Regex;
use rustls::pki_types::CertificateDer;
use sha1::{Digest, Sha1};

/// How a host proves ownership of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No proof required.
    Anonymous,
    /// SHA-1 challenge-response over a shared password.
    Password,
    /// TLS client certificate chained to the entry's CA.
    Certificate,
}

impl AuthMethod {
    /// Parse the method column of a credential line.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(AuthMethod::Anonymous),
            "password" => Some(AuthMethod::Password),
            "cert" => Some(AuthMethod::Certificate),
            _ => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Anonymous => write!(f, "none"),
            AuthMethod::Password => write!(f, "password"),
            AuthMethod::Certificate => write!(f, "cert"),
        }
    }
}

/// One credential line: wildcard patterns over the hostname stem and the
/// suffix, plus the secret for the chosen method.
pub struct Credential {
    pub(crate) host: Regex,
    pub(crate) suffix: Regex,
    pub method: AuthMethod,
    password: String,
    ca: Option<CertificateDer<'static>>,
}

impl Credential {
    pub(crate) fn new(
        host: Regex,
        suffix: Regex,
        method: AuthMethod,
        password: String,
        ca: Option<CertificateDer<'static>>,
    ) -> Self {
        Self {
            host,
            suffix,
            method,
            password,
            ca,
        }
    }

    /// The trusted CA certificate for [`AuthMethod::Certificate`] entries.
    pub fn ca(&self) -> Option<&CertificateDer<'static>> {
        self.ca.as_ref()
    }

    pub(crate) fn matches(&self, hostname: &str, suffix: &str) -> bool {
        self.host.is_match(hostname) && self.suffix.is_match(suffix)
    }

    /// Verify a password hash from the peer.
    ///
    /// The peer proves knowledge of the shared password by sending
    /// `sha1(sha1(password || uppercase(hostname)) || nonce)` where `nonce`
    /// is the 20-byte random from the control hello.
    pub fn check_password(&self, hostname: &str, nonce: &[u8], peer_hash: &[u8]) -> bool {
        let mut inner = Sha1::new();
        inner.update(self.password.as_bytes());
        inner.update(hostname.to_uppercase().as_bytes());
        let inner = inner.finalize();

        let mut outer = Sha1::new();
        outer.update(inner);
        outer.update(nonce);
        outer.finalize().as_slice() == peer_hash
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("host", &self.host.as_str())
            .field("suffix", &self.suffix.as_str())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wildcard::wildcard_pattern;

    fn password_credential(password: &str) -> Credential {
        Credential::new(
            wildcard_pattern("*").unwrap(),
            wildcard_pattern("*").unwrap(),
            AuthMethod::Password,
            password.to_string(),
            None,
        )
    }

    /// Reproduce the peer side of the challenge-response scheme.
    fn peer_hash(password: &str, hostname: &str, nonce: &[u8]) -> Vec<u8> {
        let mut h1 = Sha1::new();
        h1.update(password.as_bytes());
        h1.update(hostname.to_uppercase().as_bytes());
        let h1 = h1.finalize();
        let mut h2 = Sha1::new();
        h2.update(h1);
        h2.update(nonce);
        h2.finalize().to_vec()
    }

    #[test]
    fn accepts_correct_password_hash() {
        let cred = password_credential("s3cret");
        let nonce = [0x11u8; 20];
        let hash = peer_hash("s3cret", "vpn1", &nonce);
        assert!(cred.check_password("vpn1", &nonce, &hash));
    }

    #[test]
    fn hostname_is_uppercased_in_the_scheme() {
        let cred = password_credential("s3cret");
        let nonce = [0x22u8; 20];
        // Peer hashed against "VPN1"; broker verifies the lowercased name.
        let hash = peer_hash("s3cret", "VPN1", &nonce);
        assert!(cred.check_password("vpn1", &nonce, &hash));
    }

    #[test]
    fn rejects_wrong_password() {
        let cred = password_credential("s3cret");
        let nonce = [0x33u8; 20];
        let hash = peer_hash("wrong", "vpn1", &nonce);
        assert!(!cred.check_password("vpn1", &nonce, &hash));
    }

    #[test]
    fn rejects_wrong_nonce() {
        let cred = password_credential("s3cret");
        let hash = peer_hash("s3cret", "vpn1", &[0x44u8; 20]);
        assert!(!cred.check_password("vpn1", &[0x55u8; 20], &hash));
    }

    #[test]
    fn method_parsing() {
        assert_eq!(AuthMethod::parse("none"), Some(AuthMethod::Anonymous));
        assert_eq!(AuthMethod::parse("password"), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::parse("cert"), Some(AuthMethod::Certificate));
        assert_eq!(AuthMethod::parse("kerberos"), None);
    }
}
