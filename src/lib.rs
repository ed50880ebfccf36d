//! Skillwatch library.
//!
//! The binary in `main.rs` only wires these modules together; everything
//! it runs lives here so it can be exercised from tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod ingress;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod runtime;
pub mod scheduler;
pub mod skills;
pub mod store;
