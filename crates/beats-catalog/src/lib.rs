//! # beats-catalog
//!
//! Persistence for beats, licenses and purchases.
//!
//! ```text
//! ┌──────────┐ 1    n ┌────────────┐ 1    n ┌─────────────────────────────┐
//! │   Beat   │───────▶│  License   │───────▶│  Purchase                   │
//! │ (seller) │        │ price/terms│        │  stripe_payment_id UNIQUE   │
//! └──────────┘        └────────────┘        └─────────────────────────────┘
//! ```
//!
//! The uniqueness of `stripe_payment_id` is what makes webhook fulfillment
//! idempotent: however many times a payment is reported, only one insert wins.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beats_catalog::{CatalogStore, SqliteCatalogStore};
//!
//! let store = SqliteCatalogStore::connect("sqlite://beats.db?mode=rwc").await?;
//! let beats = store.list_published_beats().await?;
//! ```

pub mod error;
pub mod model;
pub mod store;

pub use error::{CatalogError, Result};
pub use model::{
    Beat, BeatId, BeatWithLicenses, InsertOutcome, LibraryEntry, License, LicenseId, NewBeat,
    NewLicense, NewPurchase, Purchase, PurchaseId, PurchaseStatus, UserId,
};
pub use store::{CatalogStore, MemoryCatalogStore, SqliteCatalogStore};
