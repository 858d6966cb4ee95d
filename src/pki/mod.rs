//! X.509 primitives used by the CA.
//!
//! This wraps OpenSSL for everything the CA needs: parsing certificate
//! signing requests, generating RSA keys with certificates, issuing
//! certificates for a CSR, and holding the CA's own verified key and
//! certificate material in a [`KeyCertBundle`].

use std::fmt;

use crate::commons::error::IoError;

mod bundle;
mod cert;
mod csr;

pub use self::bundle::KeyCertBundle;
pub use self::cert::{
    CertOptions, Issuer, gen_cert_from_csr, gen_cert_key_from_options, pem_encode_cert,
};
pub use self::csr::parse_pem_encoded_csr;

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    OpenSslError(openssl::error::ErrorStack),
    IoError(IoError),
    InvalidCsr(String),
    InvalidPem(String),
    KeyMismatch,
    Verification(String),
    Options(String),
}

impl Error {
    pub fn invalid_csr(e: impl fmt::Display) -> Self {
        Error::InvalidCsr(e.to_string())
    }

    pub fn invalid_pem(e: impl fmt::Display) -> Self {
        Error::InvalidPem(e.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenSslError(e) => e.fmt(f),
            Error::IoError(e) => e.fmt(f),
            Error::InvalidCsr(e) => write!(f, "Failed to parse CSR: {}", e),
            Error::InvalidPem(e) => write!(f, "Invalid PEM data: {}", e),
            Error::KeyMismatch => {
                write!(f, "The private key does not match the certificate")
            }
            Error::Verification(e) => {
                write!(f, "Cannot verify the certificate chain: {}", e)
            }
            Error::Options(e) => write!(f, "Invalid certificate options: {}", e),
        }
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Error::OpenSslError(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::IoError(e)
    }
}

impl std::error::Error for Error {}
