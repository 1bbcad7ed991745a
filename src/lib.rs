//! hostkeeper: an operator for self-hosted infrastructure.
//!
//! This crate discovers named resources on the local filesystem (compose
//! stacks to deploy, directory groups to back up), resolves user selectors
//! against them, and runs a fixed pipeline of actions over the result. Every
//! invocation produces an [`pipeline::ExecutionResult`] that records what ran
//! and what succeeded.

pub mod application;
pub mod archive;
pub mod backup;
pub mod commands;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod logging;
pub mod path;
pub mod pipeline;
pub mod process;
pub mod provider;
pub mod report;
pub mod resource;
pub mod selector;
pub mod service;
pub mod sysexits;
pub mod upload;

pub use error::Error;

/// Unified result type for the fallible library operations.
pub type Result<T> = std::result::Result<T, Error>;
