//! Formula installer library.
//!
//! This crate installs a single package described by a declarative manifest:
//! it fetches the source archive, verifies its SHA-256 digest, checks build
//! dependencies, runs the build command into an isolated prefix, and smoke
//! tests the installed binary. It is used by the `formula-installer` CLI
//! binary and can be consumed programmatically for testing or custom
//! installation workflows.
//!
//! # Modules
//!
//! - [`builder`] - Build command execution scoped to the install prefix
//! - [`cancel`] - Cooperative cancellation and interrupt-signal hookup
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Installer settings file and environment overrides
//! - [`deps`] - Dependency probing and version constraint checks
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Semantic error types
//! - [`executor`] - External command execution
//! - [`extraction`] - Source archive extraction
//! - [`fetch`] - Source download and checksum verification
//! - [`manifest`] - Package manifest model and parsing
//! - [`output`] - Progress and report formatting
//! - [`pipeline`] - Install state machine orchestration
//! - [`receipt`] - Install receipts for verified installs
//! - [`smoke`] - Post-install smoke test

pub mod builder;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod deps;
pub mod dirs;
pub mod error;
pub mod executor;
pub mod extraction;
pub mod fetch;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod receipt;
pub mod smoke;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
