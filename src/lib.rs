//! The _meshca_ library crate.
//!
//! A certificate authority issuing short-lived X.509 identity certificates
//! for workloads, backed by either a self-signed root that is persisted in
//! a secret store or an operator supplied signing key and certificate
//! chain.

pub mod ca;
pub mod cli;
pub mod commons;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod pki;
pub mod probe;
pub mod secrets;
