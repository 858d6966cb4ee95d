//! Various meshca-wide constants.


//------------ Binary Names -------------------------------------------------

/// The friendly name of the `meshca` binary.
pub const MESHCA_APP: &str = "meshca";


//------------ Config Files Paths -------------------------------------------

/// The default path to the meshca config file.
pub const MESHCA_DEFAULT_CONFIG_FILE: &str = "/etc/meshca.conf";


//------------ Environment Variables ----------------------------------------

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It will
/// be overwritten by the config file. The default is “info.”
pub const MESHCA_ENV_LOG_LEVEL: &str = "MESHCA_LOG_LEVEL";

/// The environment variable with the path to the config file.
pub const MESHCA_ENV_CONFIG: &str = "MESHCA_CONFIG";


//------------ Self-signed CA Secret ----------------------------------------

/// The name of the secret holding the self-signed root key and certificate.
pub const CA_SECRET_NAME: &str = "istio-ca-secret";

/// The secret data field holding the PEM encoded CA certificate.
pub const CA_CERT_ID: &str = "ca-cert.pem";

/// The secret data field holding the PEM encoded CA private key.
pub const CA_PRIVATE_KEY_ID: &str = "ca-key.pem";

/// The type marker attached to the CA root secret.
///
/// Other components use this to discover the secret. It is not enforced
/// when reading the secret back.
pub const CA_SECRET_TYPE: &str = "istio.io/ca-root";

/// The size in bits of the RSA key generated for a self-signed CA.
pub const CA_KEY_SIZE: u32 = 2048;


//------------ PEM Labels ---------------------------------------------------

pub const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";
