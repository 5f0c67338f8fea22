//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline media core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the store, the download
//! pipeline and the playback session depend on. It establishes the logging
//! conventions, the fail-fast configuration contract, and the event
//! broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
