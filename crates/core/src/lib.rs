//! Core building blocks for plugin signature verification: install configuration,
//! error kinds, transport encodings and digests.
//!
//! This crate has no network, CLI or cryptographic backend dependencies.

pub mod config;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod types;

pub use config::InstallConfig;
pub use digest::{DigestAlgorithm, sha256, sha256_hex};
pub use error::{Error, ErrorKind, Result};
pub use types::*;
