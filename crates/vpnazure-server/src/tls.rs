//! TLS material loading and per-suffix server configuration.
//!
//! Each suffix serves its own certificate chain, selected per connection
//! from the client hello. Control endpoints additionally *request* a client
//! certificate: hosts provisioned with the `cert` method present one and are
//! verified against the CA stored in their credential entry, everyone else
//! falls back to the in-protocol password flow.

use std::sync::Arc;

use tokio_rustls::rustls::{
    self, DigitallySignedStruct, DistinguishedName, RootCertStore, SignatureScheme,
    client::danger::HandshakeSignatureValid,
    crypto::WebPkiSupportedAlgorithms,
    pki_types::{CertificateDer, PrivateKeyDer, UnixTime},
    server::WebPkiClientVerifier,
    server::danger::{ClientCertVerified, ClientCertVerifier},
};
use vpnazure_auth::{AuthMethod, CredentialStore};

use crate::error::ServerError;

/// Load certificates from a PEM file.
pub(crate) fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(path)?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(|c| c.ok().map(|v| v.into_owned()))
        .collect();
    if certs.is_empty() {
        return Err(ServerError::Config(format!(
            "no certificates found in {path}"
        )));
    }
    Ok(certs)
}

/// Load a private key from a PEM file.
pub(crate) fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, ServerError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(path)?);
    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => {
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Some(rustls_pemfile::Item::Sec1Key(key)) => {
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Some(_) => continue,
            None => {
                return Err(ServerError::Config(format!(
                    "no private key found in {path}"
                )));
            }
        }
    }
}

/// Build the two server configurations for one suffix: the plain one served
/// to relay clients, and the control one that requests (but does not
/// require) a client certificate.
pub(crate) fn build_suffix_configs(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    creds: Arc<CredentialStore>,
    suffix: &str,
) -> Result<(Arc<rustls::ServerConfig>, Arc<rustls::ServerConfig>), ServerError> {
    let client_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain.clone(), key.clone_key())?;

    let verifier = Arc::new(ControlClientVerifier::new(creds, suffix.to_string()));
    let control_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)?;

    Ok((Arc::new(client_config), Arc::new(control_config)))
}

/// Extract the lowercased subject Common Name from a DER certificate.
pub(crate) fn peer_common_name(der: &CertificateDer<'_>) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref()).ok()?;
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_lowercase)
}

/// Client certificate verifier for control endpoints.
///
/// Presenting a certificate is optional. When one arrives, its Common Name
/// names the host; the `(CN, suffix)` credential entry must exist, use the
/// `cert` method, and its stored CA must anchor the presented chain for
/// client authentication. Any failure aborts the handshake.
#[derive(Debug)]
pub(crate) struct ControlClientVerifier {
    creds: Arc<CredentialStore>,
    suffix: String,
    root_hints: Vec<DistinguishedName>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ControlClientVerifier {
    pub(crate) fn new(creds: Arc<CredentialStore>, suffix: String) -> Self {
        Self {
            creds,
            suffix,
            root_hints: Vec::new(),
            algorithms: rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for ControlClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &self.root_hints
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let hostname = peer_common_name(end_entity)
            .ok_or_else(|| rustls::Error::General("client certificate has no common name".into()))?;

        let cred = self
            .creds
            .find(&hostname, &self.suffix)
            .ok_or_else(|| rustls::Error::General(format!("CN {hostname} is not a valid hostname")))?;
        if cred.method != AuthMethod::Certificate {
            return Err(rustls::Error::General(format!(
                "client certificate received but {hostname} does not authenticate by certificate"
            )));
        }
        let ca = cred
            .ca()
            .ok_or_else(|| rustls::Error::General("credential entry has no CA".into()))?;

        let mut roots = RootCertStore::empty();
        roots
            .add(ca.clone())
            .map_err(|e| rustls::Error::General(format!("bad CA certificate: {e}")))?;
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| rustls::Error::General(format!("verifier build failed: {e}")))?;
        verifier.verify_client_cert(end_entity, intermediates, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn self_signed_with_cn(cn: &str) -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        let cert = params.self_signed(&key).unwrap();
        cert.der().clone().into_owned()
    }

    fn store_with(line: &str) -> Arc<CredentialStore> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "vpnazure-tls-test-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, line).unwrap();
        let store = CredentialStore::new();
        store.load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        Arc::new(store)
    }

    #[test]
    fn common_name_is_extracted_lowercased() {
        let der = self_signed_with_cn("VPN1.Example.Net");
        assert_eq!(peer_common_name(&der), Some("vpn1.example.net".into()));
    }

    #[test]
    fn garbage_der_has_no_common_name() {
        let der = CertificateDer::from(b"not a certificate".to_vec());
        assert_eq!(peer_common_name(&der), None);
    }

    #[test]
    fn verifier_rejects_unknown_cn() {
        let verifier =
            ControlClientVerifier::new(store_with(""), ".example.net".to_string());
        let der = self_signed_with_cn("stranger.example.net");
        let result = verifier.verify_client_cert(&der, &[], UnixTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn verifier_rejects_non_certificate_method() {
        let verifier = ControlClientVerifier::new(
            store_with("vpn*\t.example.net\tpassword\ts3cret\n"),
            ".example.net".to_string(),
        );
        let der = self_signed_with_cn("vpn1.example.net");
        let result = verifier.verify_client_cert(&der, &[], UnixTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn client_auth_is_offered_but_optional() {
        let verifier =
            ControlClientVerifier::new(store_with(""), ".example.net".to_string());
        assert!(verifier.offer_client_auth());
        assert!(!verifier.client_auth_mandatory());
        assert!(verifier.root_hint_subjects().is_empty());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
