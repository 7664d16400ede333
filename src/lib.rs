//! Domain watch/block list for DNS request pipelines.
//!
//! A [`engine::ReloadController`] keeps an immutable [`engine::DomainIndex`]
//! fresh from a file or URL, a [`policy::PolicyEngine`] checks query names
//! against it, and [`server::PolicyHandler`] plugs the decision into a
//! `hickory-server` handler chain.

pub mod config;
pub mod engine;
pub mod error;
pub mod init;
pub mod policy;
pub mod server;
pub mod stats;
