//! Common types and helpers used throughout meshca.

pub mod error;
pub mod util;
