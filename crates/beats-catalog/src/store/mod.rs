//! Catalog Storage
//!
//! The `CatalogStore` trait is the only way the rest of the system touches
//! persisted beats and purchases.

mod memory;
mod sqlite;

pub use memory::MemoryCatalogStore;
pub use sqlite::SqliteCatalogStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Beat, BeatId, BeatWithLicenses, InsertOutcome, LibraryEntry, NewBeat, NewLicense,
    NewPurchase, Purchase, UserId,
};

/// Catalog storage trait
///
/// Implementations must enforce uniqueness of `stripe_payment_id` themselves:
/// several webhook deliveries may race to insert the same purchase and the
/// store is the only arbiter.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a published beat and its licenses atomically
    async fn create_beat(
        &self,
        seller: UserId,
        beat: NewBeat,
        licenses: Vec<NewLicense>,
    ) -> Result<BeatWithLicenses>;

    /// Published beats, newest first
    async fn list_published_beats(&self) -> Result<Vec<Beat>>;

    /// Beat by id with its licenses ordered by id
    async fn get_beat_with_licenses(&self, id: BeatId) -> Result<Option<BeatWithLicenses>>;

    /// Look up a purchase by payment reference, optionally scoped to one buyer
    async fn find_purchase_by_payment_reference(
        &self,
        reference: &str,
        buyer: Option<UserId>,
    ) -> Result<Option<Purchase>>;

    /// Insert a purchase; a clash on the payment reference is `Duplicate`, not an error
    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<InsertOutcome>;

    /// Completed purchases of a buyer joined to their beats, newest first
    async fn library_for_buyer(&self, buyer: UserId) -> Result<Vec<LibraryEntry>>;

    /// Whether the buyer owns a completed purchase of the beat
    async fn has_completed_purchase(&self, buyer: UserId, beat: BeatId) -> Result<bool>;
}
