//! Credential file parsing and lookup.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rustls::pki_types::CertificateDer;
use tracing::warn;

use crate::entry::{AuthMethod, Credential};
use crate::wildcard::wildcard_pattern;

/// Hot-reloadable list of host credentials.
///
/// Readers get an immutable snapshot; [`CredentialStore::load`] swaps the
/// whole list atomically so in-flight lookups keep the entries they pinned.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<Arc<Vec<Arc<Credential>>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the credential file and replace the active list.
    ///
    /// Format: one entry per line, tab-separated:
    /// `hostname_glob  suffix_glob  method  secret`. Lines starting with `/`
    /// or `#` and lines with too few fields for their method are skipped.
    /// Entries with invalid patterns or unusable certificates are skipped
    /// with a log line. Returns the number of accepted entries.
    pub fn load(&self, path: &Path) -> io::Result<usize> {
        let text = fs::read_to_string(path)?;
        let mut list = Vec::new();

        for line in text.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                continue;
            }
            if fields[0].starts_with('/') || fields[0].starts_with('#') {
                continue;
            }

            let Ok(host) = wildcard_pattern(&fields[0].to_lowercase()) else {
                warn!(pattern = fields[0], "auth: invalid hostname pattern");
                continue;
            };
            let Ok(suffix) = wildcard_pattern(&fields[1].to_lowercase()) else {
                warn!(pattern = fields[1], "auth: invalid suffix pattern");
                continue;
            };

            let Some(method) = AuthMethod::parse(&fields[2].to_lowercase()) else {
                continue;
            };
            match method {
                AuthMethod::Anonymous => {
                    list.push(Arc::new(Credential::new(
                        host,
                        suffix,
                        method,
                        String::new(),
                        None,
                    )));
                }
                AuthMethod::Password => {
                    if fields.len() < 4 {
                        continue;
                    }
                    list.push(Arc::new(Credential::new(
                        host,
                        suffix,
                        method,
                        fields[3].to_string(),
                        None,
                    )));
                }
                AuthMethod::Certificate => {
                    if fields.len() < 4 {
                        continue;
                    }
                    match load_ca_certificate(fields[3].as_ref()) {
                        Ok(ca) => {
                            list.push(Arc::new(Credential::new(
                                host,
                                suffix,
                                method,
                                String::new(),
                                Some(ca),
                            )));
                        }
                        Err(e) => {
                            warn!(
                                hostname = fields[0],
                                suffix = fields[1],
                                error = %e,
                                "auth: error loading CA certificate"
                            );
                        }
                    }
                }
            }
        }

        let n = list.len();
        *self.inner.write() = Arc::new(list);
        Ok(n)
    }

    /// Look up the credential for a fully qualified name under `suffix`.
    ///
    /// The hostname stem is the FQDN with the suffix stripped; a name that
    /// does not end with the suffix, or equals it, never matches. Entries
    /// are scanned in file order and the first match wins. Inputs are
    /// expected lowercased.
    pub fn find(&self, fqdn: &str, suffix: &str) -> Option<Arc<Credential>> {
        let stem = fqdn.strip_suffix(suffix)?;
        if stem.is_empty() || stem.len() == fqdn.len() {
            return None;
        }
        let list = self.inner.read().clone();
        list.iter()
            .find(|c| c.matches(stem, suffix))
            .cloned()
    }

    /// Number of active entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Read a PEM file and return its first certificate, validated as X.509.
fn load_ca_certificate(path: &Path) -> io::Result<CertificateDer<'static>> {
    let data = fs::read(path)?;
    let cert = rustls_pemfile::certs(&mut data.as_slice())
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not a valid PEM file"))??;
    if x509_parser::parse_x509_certificate(cert.as_ref()).is_err() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a valid X.509 certificate",
        ));
    }
    Ok(cert.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_from(content: &str) -> (CredentialStore, usize) {
        let mut file = tempfile();
        file.write_all(content.as_bytes()).unwrap();
        let store = CredentialStore::new();
        let n = store.load(&file.path).unwrap();
        (store, n)
    }

    struct TempFile {
        path: std::path::PathBuf,
    }

    impl TempFile {
        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            fs::write(&self.path, data)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn tempfile() -> TempFile {
        use std::sync::atomic::{AtomicU32, Ordering};
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "vpnazure-auth-test-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        TempFile { path }
    }

    #[test]
    fn parses_entries_and_skips_comments() {
        let (store, n) = store_from(
            "# comment line\tx\ty\n\
             / slash comment\tx\ty\n\
             vpn*\t.example.net\tpassword\ts3cret\n\
             short line\tonly-two\n\
             host1\t.example.net\tnone\n",
        );
        assert_eq!(n, 2);
        assert!(store.find("vpn1.example.net", ".example.net").is_some());
        assert!(store.find("host1.example.net", ".example.net").is_some());
    }

    #[test]
    fn find_strips_the_suffix_before_matching() {
        let (store, _) = store_from("vpn*\t.example.net\tnone\n");
        // Pattern matches the stem, not the full FQDN.
        assert!(store.find("vpn1.example.net", ".example.net").is_some());
        // A name equal to the suffix has no stem.
        assert!(store.find(".example.net", ".example.net").is_none());
        // A name outside the suffix never matches.
        assert!(store.find("vpn1.other.org", ".example.net").is_none());
    }

    #[test]
    fn first_matching_entry_wins() {
        let (store, _) = store_from(
            "vpn1\t.example.net\tpassword\tfirst\n\
             vpn*\t.example.net\tpassword\tsecond\n",
        );
        let cred = store.find("vpn1.example.net", ".example.net").unwrap();
        let nonce = [1u8; 20];
        // Only the first entry's password verifies.
        let mut h1 = sha1::Sha1::new();
        use sha1::Digest;
        h1.update(b"first");
        h1.update(b"VPN1");
        let h1 = h1.finalize();
        let mut h2 = sha1::Sha1::new();
        h2.update(h1);
        h2.update(nonce);
        assert!(cred.check_password("vpn1", &nonce, &h2.finalize()));
    }

    #[test]
    fn unknown_method_is_skipped() {
        let (_, n) = store_from("vpn*\t.example.net\tkerberos\tsecret\n");
        assert_eq!(n, 0);
    }

    #[test]
    fn password_without_secret_is_skipped() {
        let (_, n) = store_from("vpn*\t.example.net\tpassword\n");
        assert_eq!(n, 0);
    }

    #[test]
    fn missing_ca_file_is_skipped() {
        let (_, n) = store_from("vpn*\t.example.net\tcert\t/nonexistent/ca.pem\n");
        assert_eq!(n, 0);
    }

    #[test]
    fn cert_entry_loads_ca() {
        use rcgen::{CertificateParams, KeyPair};

        let key = KeyPair::generate().unwrap();
        let ca = CertificateParams::new(Vec::new())
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let mut ca_file = tempfile();
        ca_file.write_all(ca.pem().as_bytes()).unwrap();

        let (store, n) = store_from(&format!(
            "secure*\t.example.net\tcert\t{}\n",
            ca_file.path.display()
        ));
        assert_eq!(n, 1);
        let cred = store.find("secure1.example.net", ".example.net").unwrap();
        assert_eq!(cred.method, AuthMethod::Certificate);
        assert!(cred.ca().is_some());
    }

    #[test]
    fn reload_is_idempotent_and_replaces() {
        let mut file = tempfile();
        file.write_all(b"vpn*\t.example.net\tnone\n").unwrap();

        let store = CredentialStore::new();
        assert_eq!(store.load(&file.path).unwrap(), 1);
        assert_eq!(store.load(&file.path).unwrap(), 1);
        assert_eq!(store.len(), 1);

        file.write_all(b"other*\t.example.org\tnone\n").unwrap();
        assert_eq!(store.load(&file.path).unwrap(), 1);
        assert!(store.find("vpn1.example.net", ".example.net").is_none());
        assert!(store.find("other9.example.org", ".example.org").is_some());
    }
}
