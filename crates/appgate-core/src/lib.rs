//! Core configuration for the appgate webhook gateway.
//!
//! Holds the layered [`AppConfig`] (defaults, optional TOML file, then
//! `APPGATE__*` environment variables) and the validation rules that make a
//! missing secret or signing key a startup failure.

pub mod config;
pub mod error;

pub use config::*;
pub use error::{CoreError, Result};
