// crates/network/src/lib.rs
//! Network layer for BookPlayer sync
//!
//! - `client`: reqwest wrapper with retry and status mapping
//! - `api`: the remote content API the sync engine replays tasks against
//! - `download`: cancellable single-file transfers
//! - `progress`: aggregate progress across a folder's files

mod api;
mod client;
mod download;
mod error;
mod progress;

pub use api::{ContentListing, HttpRemoteApi, RemoteApi, RemoteFile};
pub use client::{Client, ClientConfig};
pub use download::{part_path, ByteProgress, FileDownloader, HttpFileDownloader};
pub use error::{FailureKind, NetworkError, NetworkResult};
pub use progress::{AggregateProgress, ProgressTracker};

/// Re-exported so callers can share cancellation handles with downloads
pub use tokio_util::sync::CancellationToken;
