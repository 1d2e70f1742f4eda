//! Registry-rewriting intercept proxy.
//!
//! A probe launches the package manager with its registry base URL pointed at
//! a local server from this crate. Every request the package manager makes is
//! therefore a registry request by construction: the proxy forwards it to the
//! real registry, rewrites package-metadata responses so publications newer
//! than the probe's cutoff disappear, and passes everything else through
//! byte-for-byte. Publish events observed along the way accumulate into a
//! per-probe timeline.

pub mod intercept;
pub mod server;

pub use server::{start, ProxyConfig, ProxyHandle, DEFAULT_REGISTRY};
