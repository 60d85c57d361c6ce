//! The workspace-wide content-addressed model index.
//!
//! Models are identified by a fast sampled fingerprint (the short hash) and
//! optionally by full blake3/sha256 digests. The index tracks where each
//! model lives under the global models directory and where it can be
//! downloaded from; the downloader feeds both while streaming.

mod download;
mod error;
mod hash;
mod repository;
mod types;

pub use download::{DownloadRequest, ModelDownloader, ProgressFn};
pub use error::{DownloadError, ModelIndexError};
pub use hash::{compute_blake3, compute_sha256, compute_short_hash};
pub use repository::ModelRepository;
pub use types::{IndexStats, ModelLocation, ModelSource, ModelWithLocation, SourceType};
