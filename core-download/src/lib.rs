//! # Download Pipeline Module
//!
//! Accepts download requests from producers, records them in the item
//! store, drives their transfers and places finished files in the media
//! layout.
//!
//! ## Overview
//!
//! - [`DownloadPipeline`] - enqueue, cancel, background drain, orphan recovery
//! - [`transport`] - the byte-moving seam ([`HttpTransport`], [`HostTransport`])
//! - [`naming`] - file names and media kinds derived from transfer metadata

pub mod error;
pub mod naming;
pub mod pipeline;
pub mod transport;

pub use error::{DownloadError, Result, TransferError};
pub use pipeline::{
    ActiveTransfer, DownloadPipeline, EnqueueRequest, PipelineConfig, INTERRUPTED_MESSAGE,
};
pub use transport::{
    CompletedTransfer, HostTransport, HttpTransport, PendingTransfer, TransferDelegate,
    TransferId, TransferRequest, Transport,
};
