//! The certificate authority.
//!
//! Bootstrapping produces [`CaOptions`], either from a self-signed root
//! that is kept in a secret store, or from operator supplied files. A
//! [`CertificateAuthority`] is created from those options once at startup
//! and then signs certificate requests for the rest of the process
//! lifetime.

use std::{fmt, time::Duration};

use crate::{commons::util::format_duration, pki, secrets::SecretError};

mod authority;
mod options;

pub use self::authority::CertificateAuthority;
pub use self::options::{CaOptions, CaType, PluggedCertFiles};

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    //-----------------------------------------------------------------
    // Bootstrap (fatal at start up)
    //-----------------------------------------------------------------
    KeyGeneration(pki::Error),
    Bundle(pki::Error),
    SecretStore(SecretError),
    InvalidLivenessProbe(String),

    //-----------------------------------------------------------------
    // Signing (returned to the caller)
    //-----------------------------------------------------------------
    NotReady,
    InvalidCsr(pki::Error),
    TtlExceeded { requested: Duration, max: Duration },
    Signing(pki::Error),
}

impl Error {
    /// Returns whether the error was caused by the request rather than
    /// by the state of the CA.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::InvalidCsr(_) | Error::TtlExceeded { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::KeyGeneration(e) => write!(
                f,
                "unable to generate CA cert and key for self-signed CA ({})",
                e
            ),
            Error::Bundle(e) => write!(f, "failed to create CA KeyCertBundle ({})", e),
            Error::SecretStore(e) => {
                write!(f, "failed to read the CA secret ({})", e)
            }
            Error::InvalidLivenessProbe(msg) => {
                write!(f, "invalid liveness probe options: {}", msg)
            }
            Error::NotReady => write!(f, "CA is not ready"),
            Error::InvalidCsr(e) => e.fmt(f),
            Error::TtlExceeded { requested, max } => write!(
                f,
                "requested TTL {} is greater than the max allowed TTL {}",
                format_duration(*requested),
                format_duration(*max)
            ),
            Error::Signing(e) => write!(f, "failed to sign certificate ({})", e),
        }
    }
}

impl std::error::Error for Error {}
