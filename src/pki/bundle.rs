//! The CA's own key and certificate material.

use std::path::Path;

use bytes::Bytes;
use log::debug;
use openssl::{
    pkey::{PKey, Private},
    stack::Stack,
    x509::{X509, X509StoreContext, store::X509StoreBuilder, verify::X509VerifyFlags},
};

use super::Error;
use crate::commons::util::file;

//------------ KeyCertBundle -------------------------------------------------

/// The signing key and certificate of a CA, with its chain and root.
///
/// The signing certificate and key are either both present, or both
/// absent in which case the bundle cannot be used for signing. A bundle
/// created through one of the `new_verified_*` functions always has them,
/// and its root certificate verifies the chain formed by the optional
/// intermediate certificates and the signing certificate.
///
/// The bundle is immutable once created.
#[derive(Clone, Debug, Default)]
pub struct KeyCertBundle {
    signing: Option<SigningPair>,
    cert_chain: Option<CertChain>,
    root_cert: Option<PemCert>,
}

#[derive(Clone, Debug)]
struct SigningPair {
    cert: PemCert,
    key: PKey<Private>,
    key_pem: Bytes,
}

#[derive(Clone, Debug)]
struct PemCert {
    cert: X509,
    pem: Bytes,
}

#[derive(Clone, Debug)]
struct CertChain {
    certs: Vec<X509>,
    pem: Bytes,
}

/// # Construct
impl KeyCertBundle {
    /// Builds a bundle from PEM data and verifies it.
    ///
    /// The chain may be absent, or contain one or more certificates
    /// ordered from the issuer of the signing certificate upwards.
    pub fn new_verified_from_pem(
        cert_pem: &[u8],
        key_pem: &[u8],
        cert_chain_pem: Option<&[u8]>,
        root_cert_pem: &[u8],
    ) -> Result<Self, Error> {
        let cert = PemCert::parse(cert_pem, "signing certificate")?;
        let key = PKey::private_key_from_pem(key_pem)
            .map_err(|e| Error::InvalidPem(format!("signing key: {}", e)))?;
        let cert_chain = match cert_chain_pem {
            Some(pem) => CertChain::parse(pem)?,
            None => None,
        };
        let root_cert = PemCert::parse(root_cert_pem, "root certificate")?;

        let bundle = KeyCertBundle {
            signing: Some(SigningPair {
                cert,
                key,
                key_pem: Bytes::copy_from_slice(key_pem),
            }),
            cert_chain,
            root_cert: Some(root_cert),
        };
        bundle.verify()?;
        Ok(bundle)
    }

    /// Builds a bundle from PEM files and verifies it.
    pub fn new_verified_from_file(
        cert_file: &Path,
        key_file: &Path,
        cert_chain_file: Option<&Path>,
        root_cert_file: &Path,
    ) -> Result<Self, Error> {
        let cert_pem = file::read(cert_file)?;
        let key_pem = file::read(key_file)?;
        let cert_chain_pem = cert_chain_file.map(file::read).transpose()?;
        let root_cert_pem = file::read(root_cert_file)?;

        debug!(
            "Loaded CA signing certificate from '{}'",
            cert_file.to_string_lossy()
        );

        Self::new_verified_from_pem(
            &cert_pem,
            &key_pem,
            cert_chain_pem.as_deref(),
            &root_cert_pem,
        )
    }

    /// Checks that the key belongs to the signing certificate, and that the
    /// root verifies the signing certificate through the chain.
    fn verify(&self) -> Result<(), Error> {
        let (signing, root) = match (&self.signing, &self.root_cert) {
            (Some(signing), Some(root)) => (signing, root),
            _ => {
                return Err(Error::Verification(
                    "bundle has no signing certificate or root".to_string(),
                ));
            }
        };

        if !signing.cert.cert.public_key()?.public_eq(&signing.key) {
            return Err(Error::KeyMismatch);
        }

        // The root is an anchor even when it is not self-signed.
        let mut trust = X509StoreBuilder::new()?;
        trust.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;
        trust.add_cert(root.cert.clone())?;
        let trust = trust.build();

        let mut intermediates = Stack::new()?;
        for cert in self.cert_chain() {
            intermediates.push(cert.clone())?;
        }

        let mut context = X509StoreContext::new()?;
        let verified = context.init(
            &trust,
            &signing.cert.cert,
            &intermediates,
            |context| {
                if context.verify_cert()? {
                    Ok(Ok(()))
                } else {
                    Ok(Err(context.error()))
                }
            },
        )?;

        verified.map_err(|e| Error::Verification(e.to_string()))
    }
}

/// # Access
impl KeyCertBundle {
    /// Returns whether the bundle has a signing certificate and key.
    pub fn is_ready(&self) -> bool {
        self.signing.is_some()
    }

    pub fn signing_cert(&self) -> Option<&X509> {
        self.signing.as_ref().map(|s| &s.cert.cert)
    }

    pub fn signing_key(&self) -> Option<&PKey<Private>> {
        self.signing.as_ref().map(|s| &s.key)
    }

    /// Returns the intermediate certificates, or an empty slice if the
    /// bundle has no chain.
    pub fn cert_chain(&self) -> &[X509] {
        self.cert_chain
            .as_ref()
            .map(|c| c.certs.as_slice())
            .unwrap_or_default()
    }

    pub fn root_cert(&self) -> Option<&X509> {
        self.root_cert.as_ref().map(|r| &r.cert)
    }

    /// Returns the signing certificate and its key together.
    pub fn signing_pair(&self) -> Option<(&X509, &PKey<Private>)> {
        self.signing.as_ref().map(|s| (&s.cert.cert, &s.key))
    }

    pub fn signing_cert_pem(&self) -> Option<&Bytes> {
        self.signing.as_ref().map(|s| &s.cert.pem)
    }

    pub fn signing_key_pem(&self) -> Option<&Bytes> {
        self.signing.as_ref().map(|s| &s.key_pem)
    }

    pub fn cert_chain_pem(&self) -> Option<&Bytes> {
        self.cert_chain.as_ref().map(|c| &c.pem)
    }

    pub fn root_cert_pem(&self) -> Option<&Bytes> {
        self.root_cert.as_ref().map(|r| &r.pem)
    }
}

impl PemCert {
    fn parse(pem: &[u8], what: &str) -> Result<Self, Error> {
        let cert = X509::from_pem(pem)
            .map_err(|e| Error::InvalidPem(format!("{}: {}", what, e)))?;
        Ok(PemCert {
            cert,
            pem: Bytes::copy_from_slice(pem),
        })
    }
}

impl CertChain {
    /// Parses a chain. Returns None if there is no PEM content at all.
    fn parse(pem: &[u8]) -> Result<Option<Self>, Error> {
        if pem.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let certs = X509::stack_from_pem(pem)
            .map_err(|e| Error::InvalidPem(format!("certificate chain: {}", e)))?;
        if certs.is_empty() {
            return Err(Error::invalid_pem(
                "certificate chain contains no certificates",
            ));
        }

        Ok(Some(CertChain {
            certs,
            pem: Bytes::copy_from_slice(pem),
        }))
    }
}

//------------ Tests ---------------------------------------------------------
