//! Mock upstream echo server
//!
//! A stand-in for the backend behind the proxy under test. Every request is
//! answered with a JSON description of what arrived (method, path, headers,
//! body), which is the mapping the harness's upstream-header assertions read.
//! The compose environment runs a containerized equivalent; this built-in
//! server makes local runs and the crate's own tests self-contained.

pub mod config;
pub mod server;

pub use config::UpstreamConfig;
pub use server::UpstreamServer;
