//! The `meshca` command line.

use std::fmt;

use crate::{ca, commons::error::IoError, daemon, probe::ProbeError};

pub mod options;

pub use self::options::{Command, Options};

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Daemon(daemon::Error),
    Ca(ca::Error),
    IoError(IoError),
    Probe(ProbeError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Daemon(e) => e.fmt(f),
            Error::Ca(e) => e.fmt(f),
            Error::IoError(e) => e.fmt(f),
            Error::Probe(e) => e.fmt(f),
        }
    }
}

impl From<daemon::Error> for Error {
    fn from(e: daemon::Error) -> Self {
        Error::Daemon(e)
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

impl From<ProbeError> for Error {
    fn from(e: ProbeError) -> Self {
        Error::Probe(e)
    }
}

impl std::error::Error for Error {}
