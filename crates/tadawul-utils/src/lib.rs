//! Shared utilities for the Tadawul context engine
//!
//! This crate provides the ambient pieces used by every binary in the
//! workspace: tracing subscriber setup and application-level configuration.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ConfigError, LogFormat};
pub use logging::{init_tracing, init_tracing_with};
