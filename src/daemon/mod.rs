//! Running the CA as a long lived process.

use std::fmt;

use crate::{ca, config::ConfigError, commons::error::IoError, secrets::SecretError};

pub mod start;

pub use self::start::{bootstrap, start, start_ca_daemon};

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    SecretStore(SecretError),
    Ca(ca::Error),
    IoError(IoError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(e) => e.fmt(f),
            Error::SecretStore(e) => write!(f, "cannot open secret store: {}", e),
            Error::Ca(e) => write!(f, "cannot create CA: {}", e),
            Error::IoError(e) => e.fmt(f),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<SecretError> for Error {
    fn from(e: SecretError) -> Self {
        Error::SecretStore(e)
    }
}

impl From<ca::Error> for Error {
    fn from(e: ca::Error) -> Self {
        Error::Ca(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::IoError(e)
    }
}

impl std::error::Error for Error {}
