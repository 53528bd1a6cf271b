//! # beats-media
//!
//! Object storage for beat audio and cover art.
//!
//! ```text
//! ┌──────────┐ presign ┌──────────────┐   PUT (signed URL)   ┌──────────┐
//! │  Client  │────────▶│ beats-server │                      │    S3    │
//! │          │◀────────│  BlobStore   │                      │  bucket  │
//! │          │────────────────────────────────────────────────▶│          │
//! └──────────┘                                               └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beats_media::{upload_key, BlobStore, S3Config, S3Presigner};
//!
//! let presigner = S3Presigner::new(S3Config::new("us-east-1", key_id, secret, "beats"))?;
//! let key = upload_key(user_id, "night-drive.wav", Utc::now());
//! let signed = presigner.presign_upload(&key, "audio/wav")?;
//! ```

mod blob;
mod error;
mod s3;

pub use blob::{resolve_content_type, sanitize_filename, upload_key, BlobStore, SignedUrl};
pub use error::{MediaError, Result};
pub use s3::{S3Config, S3Presigner};
