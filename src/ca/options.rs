//! Bootstrapping the CA's key and certificate material.

use std::{fmt, path::PathBuf, time::Duration};

use log::{error, info};

use super::Error;
use crate::{
    constants::{CA_CERT_ID, CA_KEY_SIZE, CA_PRIVATE_KEY_ID, CA_SECRET_NAME, CA_SECRET_TYPE},
    pki::{self, CertOptions, KeyCertBundle, gen_cert_key_from_options},
    probe::ProbeOptions,
    secrets::{Secret, SecretStore},
};

//------------ CaType --------------------------------------------------------

/// Where the CA's signing key and certificate come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaType {
    /// A self-signed root, kept in the secret store in this namespace.
    SelfSigned { namespace: String },

    /// Key and certificates supplied by the operator.
    PluggedCert(PluggedCertFiles),
}

impl CaType {
    pub fn is_self_signed(&self) -> bool {
        matches!(self, CaType::SelfSigned { .. })
    }
}

impl fmt::Display for CaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaType::SelfSigned { namespace } => {
                write!(f, "self-signed (namespace '{}')", namespace)
            }
            CaType::PluggedCert(files) => write!(
                f,
                "plugged cert (signing cert '{}')",
                files.signing_cert.to_string_lossy()
            ),
        }
    }
}

//------------ PluggedCertFiles ----------------------------------------------

/// The PEM files for a plugged certificate CA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PluggedCertFiles {
    /// Intermediates between the signing certificate and the root, if any.
    pub cert_chain: Option<PathBuf>,
    pub signing_cert: PathBuf,
    pub signing_key: PathBuf,
    pub root_cert: PathBuf,
}

//------------ CaOptions -----------------------------------------------------

/// Everything needed to create a [`CertificateAuthority`].
///
/// [`CertificateAuthority`]: super::CertificateAuthority
#[derive(Clone, Debug)]
pub struct CaOptions {
    pub ca_type: CaType,

    /// The default TTL for issued certificates.
    pub cert_ttl: Duration,

    /// The maximum TTL a caller may ask for.
    pub max_cert_ttl: Duration,

    /// Whether certificates issued through `sign` may sign themselves.
    pub multicluster: bool,

    pub key_cert_bundle: KeyCertBundle,

    pub liveness_probe: Option<ProbeOptions>,
    pub probe_check_interval: Duration,
}

impl CaOptions {
    const DFLT_PROBE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

    /// Returns options for a CA using a self-signed root.
    ///
    /// The first time around a new key and self-signed certificate are
    /// generated and written to the well-known CA secret in `namespace`.
    /// On later starts they are read back from that secret. A failure to
    /// write the secret is logged and otherwise ignored, the CA will then
    /// use a new root after a restart.
    ///
    /// Only a missing secret leads to a new root. Any other error when
    /// reading the secret is returned, as is a stored key and certificate
    /// that fail to verify.
    #[allow(clippy::too_many_arguments)]
    pub fn new_self_signed(
        root_cert_ttl: Duration,
        cert_ttl: Duration,
        max_cert_ttl: Duration,
        multicluster: bool,
        org: &str,
        namespace: &str,
        store: &dyn SecretStore,
    ) -> Result<Self, Error> {
        let key_cert_bundle = match store.get(namespace, CA_SECRET_NAME) {
            Ok(secret) => {
                info!(
                    "Using the self-signed CA root stored in secret '{}' in namespace '{}'",
                    CA_SECRET_NAME, namespace
                );
                Self::bundle_from_secret(&secret)?
            }
            Err(e) if e.is_not_found() => {
                info!("Failed to get secret ({}), will create one", e);
                Self::generate_and_persist(root_cert_ttl, org, namespace, store)?
            }
            Err(e) => return Err(Error::SecretStore(e)),
        };

        Ok(CaOptions {
            ca_type: CaType::SelfSigned {
                namespace: namespace.to_string(),
            },
            cert_ttl,
            max_cert_ttl,
            multicluster,
            key_cert_bundle,
            liveness_probe: None,
            probe_check_interval: Self::DFLT_PROBE_CHECK_INTERVAL,
        })
    }

    /// Returns options for a CA using operator supplied key and
    /// certificates.
    pub fn new_plugged_cert(
        files: PluggedCertFiles,
        cert_ttl: Duration,
        max_cert_ttl: Duration,
        multicluster: bool,
    ) -> Result<Self, Error> {
        let key_cert_bundle = KeyCertBundle::new_verified_from_file(
            &files.signing_cert,
            &files.signing_key,
            files.cert_chain.as_deref(),
            &files.root_cert,
        )
        .map_err(Error::Bundle)?;

        Ok(CaOptions {
            ca_type: CaType::PluggedCert(files),
            cert_ttl,
            max_cert_ttl,
            multicluster,
            key_cert_bundle,
            liveness_probe: None,
            probe_check_interval: Self::DFLT_PROBE_CHECK_INTERVAL,
        })
    }

    /// Sets the liveness file options and how often liveness is checked.
    ///
    /// Both intervals must be non-zero and the path must not be empty.
    pub fn with_liveness_probe(
        mut self,
        options: ProbeOptions,
        check_interval: Duration,
    ) -> Result<Self, Error> {
        if !options.is_valid() {
            return Err(Error::InvalidLivenessProbe(format!(
                "path '{}' with update interval {:?}",
                options.path.to_string_lossy(),
                options.update_interval
            )));
        }
        if check_interval.is_zero() {
            return Err(Error::InvalidLivenessProbe(
                "check interval must be greater than zero".to_string(),
            ));
        }
        self.liveness_probe = Some(options);
        self.probe_check_interval = check_interval;
        Ok(self)
    }

    fn bundle_from_secret(secret: &Secret) -> Result<KeyCertBundle, Error> {
        let field = |id: &str| {
            secret.get(id).ok_or_else(|| {
                Error::Bundle(pki::Error::InvalidPem(format!(
                    "secret '{}' has no field '{}'",
                    secret.name, id
                )))
            })
        };
        let cert = field(CA_CERT_ID)?;
        let key = field(CA_PRIVATE_KEY_ID)?;

        KeyCertBundle::new_verified_from_pem(cert, key, None, cert).map_err(Error::Bundle)
    }

    fn generate_and_persist(
        root_cert_ttl: Duration,
        org: &str,
        namespace: &str,
        store: &dyn SecretStore,
    ) -> Result<KeyCertBundle, Error> {
        let options = CertOptions {
            ttl: root_cert_ttl,
            org: org.to_string(),
            is_ca: true,
            is_self_signed: true,
            rsa_key_size: CA_KEY_SIZE,
            signer: None,
        };
        let (pem_cert, pem_key) =
            gen_cert_key_from_options(&options).map_err(Error::KeyGeneration)?;

        let bundle = KeyCertBundle::new_verified_from_pem(&pem_cert, &pem_key, None, &pem_cert)
            .map_err(Error::Bundle)?;

        let secret = Secret::new(namespace, CA_SECRET_NAME, CA_SECRET_TYPE)
            .with_data(CA_CERT_ID, pem_cert)
            .with_data(CA_PRIVATE_KEY_ID, pem_key);
        match store.create(&secret) {
            Ok(()) => info!(
                "Stored new self-signed CA root in secret '{}' in namespace '{}'",
                CA_SECRET_NAME, namespace
            ),
            Err(e) => error!(
                "Failed to write secret to CA (error: {}). This CA will not persist when restart.",
                e
            ),
        }

        Ok(bundle)
    }
}

//------------ Tests ---------------------------------------------------------
