//! Parley Common - Shared configuration, logging, and error types.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ChatCompletionConfig, Config, IrcConfig, MemoryConfig, ObservabilityConfig, ReconnectConfig,
};
pub use error::{Error, Result};
