//! In-memory catalog store (for development and tests)

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::CatalogStore;
use crate::error::{CatalogError, Result};
use crate::model::{
    Beat, BeatId, BeatWithLicenses, InsertOutcome, LibraryEntry, License, LicenseId, NewBeat,
    NewLicense, NewPurchase, Purchase, PurchaseId, PurchaseStatus, UserId,
};

#[derive(Default)]
struct Tables {
    beats: HashMap<BeatId, Beat>,
    licenses: Vec<License>,
    purchases: Vec<Purchase>,
    by_payment_reference: HashMap<String, usize>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn with_licenses(&self, beat: &Beat) -> BeatWithLicenses {
        let mut licenses: Vec<License> = self
            .licenses
            .iter()
            .filter(|l| l.beat_id == beat.id)
            .cloned()
            .collect();
        licenses.sort_by_key(|l| l.id);
        BeatWithLicenses {
            beat: beat.clone(),
            licenses,
        }
    }
}

/// In-memory catalog store
///
/// Every operation takes the lock once, so the find-then-insert inside
/// `insert_purchase` is atomic like a unique index.
#[derive(Default)]
pub struct MemoryCatalogStore {
    tables: RwLock<Tables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".into()))
    }

    /// Number of stored purchases
    pub fn purchase_count(&self) -> Result<usize> {
        Ok(self.read()?.purchases.len())
    }

    /// Insert a beat without licenses (or unpublished); lets tests build
    /// catalog states the public API refuses to create
    pub fn insert_raw_beat(
        &self,
        seller: UserId,
        beat: NewBeat,
        licenses: Vec<NewLicense>,
        is_published: bool,
    ) -> Result<BeatWithLicenses> {
        let mut tables = self.write()?;
        let now = Utc::now();
        let id = BeatId(tables.next_id());
        let stored = Beat {
            id,
            title: beat.title.trim().to_string(),
            description: beat.description,
            price: beat.price,
            audio_key: beat.audio_key,
            cover_image_key: beat.cover_image_key,
            genre: beat.genre,
            bpm: beat.bpm,
            musical_key: beat.musical_key,
            seller_id: seller,
            is_published,
            created_at: now,
            updated_at: now,
        };
        tables.beats.insert(id, stored.clone());

        for license in licenses {
            let license_id = LicenseId(tables.next_id());
            tables.licenses.push(License {
                id: license_id,
                beat_id: id,
                name: license.name,
                description: license.description,
                price: license.price,
                terms: license.terms,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(tables.with_licenses(&stored))
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn create_beat(
        &self,
        seller: UserId,
        beat: NewBeat,
        licenses: Vec<NewLicense>,
    ) -> Result<BeatWithLicenses> {
        beat.validate()?;
        if licenses.is_empty() {
            return Err(CatalogError::Validation("A beat needs at least one license".into()));
        }
        self.insert_raw_beat(seller, beat, licenses, true)
    }

    async fn list_published_beats(&self) -> Result<Vec<Beat>> {
        let tables = self.read()?;
        let mut beats: Vec<Beat> = tables
            .beats
            .values()
            .filter(|b| b.is_published)
            .cloned()
            .collect();
        beats.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(beats)
    }

    async fn get_beat_with_licenses(&self, id: BeatId) -> Result<Option<BeatWithLicenses>> {
        let tables = self.read()?;
        Ok(tables.beats.get(&id).map(|beat| tables.with_licenses(beat)))
    }

    async fn find_purchase_by_payment_reference(
        &self,
        reference: &str,
        buyer: Option<UserId>,
    ) -> Result<Option<Purchase>> {
        let tables = self.read()?;
        Ok(tables
            .by_payment_reference
            .get(reference)
            .map(|&idx| &tables.purchases[idx])
            .filter(|p| buyer.is_none_or(|b| p.buyer_id == b))
            .cloned())
    }

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<InsertOutcome> {
        let mut tables = self.write()?;
        if tables.by_payment_reference.contains_key(&purchase.stripe_payment_id) {
            return Ok(InsertOutcome::Duplicate);
        }

        let now = Utc::now();
        let stored = Purchase {
            id: PurchaseId(tables.next_id()),
            buyer_id: purchase.buyer_id,
            beat_id: purchase.beat_id,
            license_id: purchase.license_id,
            amount: purchase.amount,
            status: purchase.status,
            stripe_payment_id: purchase.stripe_payment_id,
            created_at: now,
            updated_at: now,
        };
        let idx = tables.purchases.len();
        tables
            .by_payment_reference
            .insert(stored.stripe_payment_id.clone(), idx);
        tables.purchases.push(stored.clone());

        Ok(InsertOutcome::Inserted(stored))
    }

    async fn library_for_buyer(&self, buyer: UserId) -> Result<Vec<LibraryEntry>> {
        let tables = self.read()?;
        let mut entries: Vec<LibraryEntry> = tables
            .purchases
            .iter()
            .filter(|p| p.buyer_id == buyer && p.status == PurchaseStatus::Completed)
            .filter_map(|p| {
                tables.beats.get(&p.beat_id).map(|beat| LibraryEntry {
                    purchase_id: p.id,
                    beat_id: beat.id,
                    license_id: p.license_id,
                    title: beat.title.clone(),
                    description: beat.description.clone(),
                    genre: beat.genre.clone(),
                    bpm: beat.bpm,
                    musical_key: beat.musical_key.clone(),
                    audio_key: beat.audio_key.clone(),
                    cover_image_key: beat.cover_image_key.clone(),
                    amount: p.amount,
                    purchased_at: p.created_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.purchased_at
                .cmp(&a.purchased_at)
                .then(b.purchase_id.cmp(&a.purchase_id))
        });
        Ok(entries)
    }

    async fn has_completed_purchase(&self, buyer: UserId, beat: BeatId) -> Result<bool> {
        let tables = self.read()?;
        Ok(tables.purchases.iter().any(|p| {
            p.buyer_id == buyer && p.beat_id == beat && p.status == PurchaseStatus::Completed
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn draft(title: &str) -> NewBeat {
        NewBeat {
            title: title.into(),
            description: None,
            price: dec!(19.99),
            audio_key: format!("beats/1/{title}.wav"),
            cover_image_key: None,
            genre: None,
            bpm: None,
            musical_key: None,
        }
    }

    fn purchase(reference: &str, buyer: i64, beat: BeatId, license: LicenseId) -> NewPurchase {
        NewPurchase {
            buyer_id: UserId(buyer),
            beat_id: beat,
            license_id: license,
            amount: dec!(19.99),
            status: PurchaseStatus::Completed,
            stripe_payment_id: reference.into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_beat() {
        let store = MemoryCatalogStore::new();
        let created = store
            .create_beat(UserId(1), draft("Night Drive"), vec![NewLicense::standard(dec!(19.99))])
            .await
            .unwrap();

        let fetched = store.get_beat_with_licenses(created.beat.id).await.unwrap().unwrap();
        assert_eq!(fetched.beat.title, "Night Drive");
        assert_eq!(fetched.licenses.len(), 1);
        assert_eq!(fetched.basic_license().unwrap().price, dec!(19.99));
    }

    #[tokio::test]
    async fn test_unpublished_beats_are_not_listed() {
        let store = MemoryCatalogStore::new();
        store.insert_raw_beat(UserId(1), draft("Draft"), vec![], false).unwrap();
        store
            .create_beat(UserId(1), draft("Live"), vec![NewLicense::standard(dec!(5))])
            .await
            .unwrap();

        let listed = store.list_published_beats().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Live");
    }

    #[tokio::test]
    async fn test_duplicate_payment_reference() {
        let store = MemoryCatalogStore::new();
        let beat = store
            .create_beat(UserId(1), draft("Loop"), vec![NewLicense::standard(dec!(10))])
            .await
            .unwrap();
        let license = beat.licenses[0].id;

        let first = store.insert_purchase(purchase("pi_1", 5, beat.beat.id, license)).await.unwrap();
        let second = store.insert_purchase(purchase("pi_1", 5, beat.beat.id, license)).await.unwrap();

        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert!(matches!(second, InsertOutcome::Duplicate));
        assert_eq!(store.purchase_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let store = Arc::new(MemoryCatalogStore::new());
        let beat = store
            .create_beat(UserId(1), draft("Race"), vec![NewLicense::standard(dec!(10))])
            .await
            .unwrap();
        let (beat_id, license) = (beat.beat.id, beat.licenses[0].id);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.insert_purchase(purchase("pi_race", 5, beat_id, license)).await
                })
            })
            .collect();

        let mut inserted = 0;
        for result in futures::future::join_all(tasks).await {
            if let InsertOutcome::Inserted(_) = result.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.purchase_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_buyer_scoped_lookup() {
        let store = MemoryCatalogStore::new();
        let beat = store
            .create_beat(UserId(1), draft("Scoped"), vec![NewLicense::standard(dec!(10))])
            .await
            .unwrap();
        store
            .insert_purchase(purchase("pi_scope", 5, beat.beat.id, beat.licenses[0].id))
            .await
            .unwrap();

        assert!(store.find_purchase_by_payment_reference("pi_scope", None).await.unwrap().is_some());
        assert!(store
            .find_purchase_by_payment_reference("pi_scope", Some(UserId(5)))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_purchase_by_payment_reference("pi_scope", Some(UserId(6)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_library_and_ownership() {
        let store = MemoryCatalogStore::new();
        let beat = store
            .create_beat(UserId(1), draft("Owned"), vec![NewLicense::standard(dec!(10))])
            .await
            .unwrap();
        store
            .insert_purchase(purchase("pi_lib", 5, beat.beat.id, beat.licenses[0].id))
            .await
            .unwrap();

        let library = store.library_for_buyer(UserId(5)).await.unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].title, "Owned");
        assert!(store.has_completed_purchase(UserId(5), beat.beat.id).await.unwrap());
        assert!(!store.has_completed_purchase(UserId(6), beat.beat.id).await.unwrap());
        assert!(store.library_for_buyer(UserId(6)).await.unwrap().is_empty());
    }
}
