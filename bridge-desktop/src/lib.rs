//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` streaming bodies
//! - `FileSystemAccess` using `tokio::fs`
//! - `LifecycleObserver` driven by the desktop shell (window minimize/restore)
//!
//! Playback bridges (media engine, audio session, now-playing surface) are
//! supplied by the host UI toolkit and have no default here.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let fs = TokioFileSystem::new();
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod background;
mod filesystem;
mod http;

pub use background::DesktopLifecycleObserver;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
