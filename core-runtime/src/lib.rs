//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the picker data layer:
//! - Logging and tracing setup
//! - Configuration management
//! - Event bus system
//!
//! The provider, sync and service crates share its configuration type and
//! event definitions.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
