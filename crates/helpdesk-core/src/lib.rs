//! # Helpdesk Core
//!
//! Shared building blocks for the help desk workspace:
//! configuration loading, the common error type, and the domain records
//! (knowledge entries, help-center articles, conversation messages) that the
//! tenancy, knowledge and gateway crates exchange.

pub mod config;
pub mod error;
pub mod types;

pub use config::HelpdeskConfig;
pub use error::{HelpdeskError, Result};
