//! DNS suffix store.
//!
//! Every suffix the broker serves owns a TLS identity and a control FQDN.
//! Incoming connections are classified from the server name in the client
//! hello: the control FQDN selects the server endpoint, any other name under
//! the suffix selects a client endpoint.

use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use tokio_rustls::rustls::ServerConfig;
use tracing::warn;
use vpnazure_auth::CredentialStore;

use crate::tls;

/// One served suffix with its TLS material.
pub struct SuffixEntry {
    /// Lowercased suffix, starting with `.` (e.g. `.example.net`).
    pub suffix: String,
    /// FQDN the broker answers on for server control sessions.
    pub control_fqdn: String,
    /// SHA-1 of the leaf certificate, sent to hosts as an integrity token.
    pub cert_sha1: [u8; 20],
    /// Configuration served to relay clients.
    pub client_config: Arc<ServerConfig>,
    /// Configuration served to control endpoints (requests client certs).
    pub control_config: Arc<ServerConfig>,
}

/// Classification of a server-name-indication value.
pub enum Endpoint {
    /// The name is a suffix's control FQDN.
    Control(Arc<SuffixEntry>),
    /// The name addresses a host under a suffix.
    Client {
        hostname: String,
        entry: Arc<SuffixEntry>,
    },
    /// No suffix matched.
    Unknown,
}

/// Hot-reloadable suffix list.
#[derive(Default)]
pub struct SuffixStore {
    inner: RwLock<Arc<Vec<Arc<SuffixEntry>>>>,
}

impl SuffixStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the suffix file and replace the active list.
    ///
    /// Format: one entry per line, tab-separated:
    /// `suffix  control_fqdn  cert_chain_path  private_key_path`. Lines
    /// starting with `/` or `#`, lines with fewer than four fields, and
    /// suffixes not starting with `.` are skipped. Entries whose certificate
    /// pair fails to load are skipped with a log line. Returns the number of
    /// accepted entries.
    pub fn load(&self, path: &Path, creds: &Arc<CredentialStore>) -> io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let mut list = Vec::new();

        for line in text.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                continue;
            }
            if fields[0].starts_with('/') || fields[0].starts_with('#') {
                continue;
            }
            if !fields[0].starts_with('.') {
                continue;
            }

            let suffix = fields[0].to_lowercase();
            let control_fqdn = fields[1].to_lowercase();

            let loaded = tls::load_certs(fields[2]).and_then(|chain| {
                let key = tls::load_private_key(fields[3])?;
                Ok((chain, key))
            });
            let (chain, key) = match loaded {
                Ok(v) => v,
                Err(e) => {
                    warn!(suffix = %suffix, error = %e, "suffix: error loading certificates");
                    continue;
                }
            };

            let cert_sha1: [u8; 20] = Sha1::digest(chain[0].as_ref()).into();

            match tls::build_suffix_configs(chain, key, creds.clone(), &suffix) {
                Ok((client_config, control_config)) => {
                    list.push(Arc::new(SuffixEntry {
                        suffix,
                        control_fqdn,
                        cert_sha1,
                        client_config,
                        control_config,
                    }));
                }
                Err(e) => {
                    warn!(suffix = %suffix, error = %e, "suffix: error building TLS config");
                }
            }
        }

        let n = list.len();
        *self.inner.write() = Arc::new(list);
        Ok(n)
    }

    /// Classify a server-name-indication value.
    ///
    /// The name is lowercased and anything from the first `/` on is dropped
    /// (a NAT-traversal hint some clients append). Entries are scanned in
    /// file order: an exact control-FQDN match wins, otherwise a name that
    /// ends with the suffix without being equal to it is a client endpoint.
    pub fn classify(&self, sni: &str) -> Endpoint {
        let lowered = sni.to_lowercase();
        let name = match lowered.find('/') {
            Some(i) => &lowered[..i],
            None => lowered.as_str(),
        };

        let list = self.inner.read().clone();
        for entry in list.iter() {
            if name == entry.control_fqdn {
                return Endpoint::Control(entry.clone());
            }
            if let Some(stem) = name.strip_suffix(&entry.suffix) {
                if !stem.is_empty() {
                    return Endpoint::Client {
                        hostname: name.to_string(),
                        entry: entry.clone(),
                    };
                }
            }
        }
        Endpoint::Unknown
    }

    /// Get an entry by its exact suffix string.
    pub fn get(&self, suffix: &str) -> Option<Arc<SuffixEntry>> {
        let list = self.inner.read().clone();
        list.iter().find(|e| e.suffix == suffix).cloned()
    }

    /// Number of active entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vpnazure-suffix-test-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    fn test_cert_pair(name: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        use rcgen::{CertifiedKey, generate_simple_self_signed};
        let CertifiedKey {
            cert, signing_key, ..
        } = generate_simple_self_signed(vec![
            "control.example.net".to_string(),
            "*.example.net".to_string(),
        ])
        .unwrap();
        (
            write_temp(&format!("{name}-cert.pem"), &cert.pem()),
            write_temp(&format!("{name}-key.pem"), &signing_key.serialize_pem()),
        )
    }

    fn loaded_store(name: &str) -> SuffixStore {
        let (cert, key) = test_cert_pair(name);
        let file = write_temp(
            &format!("{name}-suffixes"),
            &format!(
                "# comment\tx\ty\tz\n\
                 .example.net\tcontrol.example.net\t{}\t{}\n\
                 noleadingdot\tc.x\t{}\t{}\n",
                cert.display(),
                key.display(),
                cert.display(),
                key.display()
            ),
        );
        let creds = Arc::new(CredentialStore::new());
        let store = SuffixStore::new();
        let n = store.load(&file, &creds).unwrap();
        assert_eq!(n, 1);
        store
    }

    #[test]
    fn classifies_control_and_client_names() {
        let store = loaded_store("classify");

        assert!(matches!(
            store.classify("control.example.net"),
            Endpoint::Control(_)
        ));
        match store.classify("vpn1.example.net") {
            Endpoint::Client { hostname, entry } => {
                assert_eq!(hostname, "vpn1.example.net");
                assert_eq!(entry.suffix, ".example.net");
            }
            _ => panic!("expected client endpoint"),
        }
    }

    #[test]
    fn bare_suffix_and_foreign_names_do_not_match() {
        let store = loaded_store("nomatch");
        assert!(matches!(store.classify("example.net"), Endpoint::Unknown));
        assert!(matches!(store.classify(".example.net"), Endpoint::Unknown));
        assert!(matches!(store.classify("vpn1.other.org"), Endpoint::Unknown));
    }

    #[test]
    fn nat_hint_is_stripped() {
        let store = loaded_store("hint");
        match store.classify("VPN1.Example.Net/natt-hint") {
            Endpoint::Client { hostname, .. } => assert_eq!(hostname, "vpn1.example.net"),
            _ => panic!("expected client endpoint"),
        }
        assert!(matches!(
            store.classify("control.example.net/hint"),
            Endpoint::Control(_)
        ));
    }

    #[test]
    fn get_by_exact_suffix() {
        let store = loaded_store("get");
        assert!(store.get(".example.net").is_some());
        assert!(store.get(".example.org").is_none());
        assert_eq!(store.get(".example.net").unwrap().cert_sha1.len(), 20);
    }

    #[test]
    fn bad_cert_paths_are_skipped() {
        let file = write_temp(
            "badcert-suffixes",
            ".example.net\tcontrol.example.net\t/nonexistent/c.pem\t/nonexistent/k.pem\n",
        );
        let creds = Arc::new(CredentialStore::new());
        let store = SuffixStore::new();
        assert_eq!(store.load(&file, &creds).unwrap(), 0);
        assert!(store.is_empty());
    }
}
