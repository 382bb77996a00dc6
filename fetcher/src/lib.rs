//! cagefetch library.
//!
//! This crate fetches base-system releases into ZFS datasets, verifies them
//! against their `MANIFEST`, extracts and patches them, and provisions plugin
//! jails on top. It is used by the `cagefetch` binary and can be driven
//! programmatically with any of its trait seams replaced.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - Host command execution
//! - [`config`] - Configuration file loading
//! - [`dataset`] - Dataset naming, creation, and mounting
//! - [`eol`] - End-of-life release markers
//! - [`error`] - Error types and the crate `Result`
//! - [`extract`] - Safe archive extraction
//! - [`fetch`] - Release fetch orchestration and the release menu
//! - [`git`] - Repository cloning and updating
//! - [`interrupt`] - SIGINT handling for provisioning
//! - [`list_output`] - Listing formatters
//! - [`manifest`] - `MANIFEST` parsing and hashing
//! - [`patch`] - Patching extracted releases
//! - [`plugin`] - Plugin descriptors, the index, and provisioning
//! - [`progress`] - Transfer progress bars
//! - [`prompt`] - Terminal prompts
//! - [`transport`] - Local, FTP, and HTTP backends
//! - [`verify`] - Verification of downloaded files

pub mod cli;
pub mod command;
pub mod config;
pub mod dataset;
pub mod eol;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod git;
pub mod interrupt;
pub mod list_output;
pub mod manifest;
pub mod patch;
pub mod plugin;
pub mod progress;
pub mod prompt;
pub mod transport;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
