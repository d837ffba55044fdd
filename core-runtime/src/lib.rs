//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the catalog crates:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate holds the pieces every other crate leans on: the `tracing`
//! subscriber setup, the fail-fast [`CoreConfig`](config::CoreConfig) builder,
//! and the broadcast [`EventBus`](events::EventBus) used to trigger background
//! maintenance.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
