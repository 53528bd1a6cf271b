//! SQLite catalog store
//!
//! Schema setup is idempotent (`CREATE TABLE IF NOT EXISTS`) and runs on every
//! connect. Decimals are stored as TEXT so no precision is lost.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::CatalogStore;
use crate::error::{CatalogError, Result};
use crate::model::{
    Beat, BeatId, BeatWithLicenses, InsertOutcome, LibraryEntry, License, LicenseId, NewBeat,
    NewLicense, NewPurchase, Purchase, PurchaseId, PurchaseStatus, UserId,
};

/// SQLite-backed catalog store
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let path = options.get_filename().display().to_string();

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        info!(path = %path, "Opened catalog database");
        Self::from_pool(pool).await
    }

    /// Private in-memory database; one connection so every query sees the same data
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn licenses_for(&self, beat: BeatId) -> Result<Vec<License>> {
        let rows = sqlx::query(
            r#"
            SELECT id, beat_id, name, description, price, terms, created_at, updated_at
            FROM licenses
            WHERE beat_id = ?
            ORDER BY id
            "#,
        )
        .bind(beat.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(license_from_row).collect()
    }
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS beats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            price TEXT NOT NULL,
            audio_key TEXT NOT NULL,
            cover_image_key TEXT,
            genre TEXT,
            bpm INTEGER,
            musical_key TEXT,
            seller_id INTEGER NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS licenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            beat_id INTEGER NOT NULL REFERENCES beats(id),
            name TEXT NOT NULL,
            description TEXT,
            price TEXT NOT NULL,
            terms TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // stripe_payment_id UNIQUE is the fulfillment idempotency guard
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            buyer_id INTEGER NOT NULL,
            beat_id INTEGER NOT NULL REFERENCES beats(id),
            license_id INTEGER NOT NULL REFERENCES licenses(id),
            amount TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            stripe_payment_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_licenses_beat ON licenses(beat_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_purchases_buyer ON purchases(buyer_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_beats_published ON beats(is_published, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| CatalogError::Corrupt(format!("{column} '{raw}' is not a decimal: {e}")))
}

fn bpm(row: &SqliteRow) -> Result<Option<u32>> {
    let raw: Option<i64> = row.try_get("bpm")?;
    raw.map(u32::try_from)
        .transpose()
        .map_err(|_| CatalogError::Corrupt("bpm out of range".into()))
}

fn beat_from_row(row: &SqliteRow) -> Result<Beat> {
    Ok(Beat {
        id: BeatId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: decimal(row, "price")?,
        audio_key: row.try_get("audio_key")?,
        cover_image_key: row.try_get("cover_image_key")?,
        genre: row.try_get("genre")?,
        bpm: bpm(row)?,
        musical_key: row.try_get("musical_key")?,
        seller_id: UserId(row.try_get("seller_id")?),
        is_published: row.try_get("is_published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn license_from_row(row: &SqliteRow) -> Result<License> {
    Ok(License {
        id: LicenseId(row.try_get("id")?),
        beat_id: BeatId(row.try_get("beat_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: decimal(row, "price")?,
        terms: row.try_get("terms")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn purchase_from_row(row: &SqliteRow) -> Result<Purchase> {
    let status: String = row.try_get("status")?;
    Ok(Purchase {
        id: PurchaseId(row.try_get("id")?),
        buyer_id: UserId(row.try_get("buyer_id")?),
        beat_id: BeatId(row.try_get("beat_id")?),
        license_id: LicenseId(row.try_get("license_id")?),
        amount: decimal(row, "amount")?,
        status: PurchaseStatus::parse(&status)?,
        stripe_payment_id: row.try_get("stripe_payment_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const BEAT_COLUMNS: &str = "id, title, description, price, audio_key, cover_image_key, genre, \
bpm, musical_key, seller_id, is_published, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, buyer_id, beat_id, license_id, amount, status, \
stripe_payment_id, created_at, updated_at";

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
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

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let beat_id = sqlx::query(
            r#"
            INSERT INTO beats (title, description, price, audio_key, cover_image_key, genre,
                               bpm, musical_key, seller_id, is_published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(beat.title.trim())
        .bind(&beat.description)
        .bind(beat.price.to_string())
        .bind(&beat.audio_key)
        .bind(&beat.cover_image_key)
        .bind(&beat.genre)
        .bind(beat.bpm.map(i64::from))
        .bind(&beat.musical_key)
        .bind(seller.get())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for license in &licenses {
            sqlx::query(
                r#"
                INSERT INTO licenses (beat_id, name, description, price, terms, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(beat_id)
            .bind(&license.name)
            .bind(&license.description)
            .bind(license.price.to_string())
            .bind(&license.terms)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(beat_id, seller = %seller, licenses = licenses.len(), "Published beat");

        self.get_beat_with_licenses(BeatId(beat_id))
            .await?
            .ok_or_else(|| CatalogError::Corrupt(format!("beat {beat_id} vanished after insert")))
    }

    async fn list_published_beats(&self) -> Result<Vec<Beat>> {
        let rows = sqlx::query(&format!(
            "SELECT {BEAT_COLUMNS} FROM beats WHERE is_published = 1 ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(beat_from_row).collect()
    }

    async fn get_beat_with_licenses(&self, id: BeatId) -> Result<Option<BeatWithLicenses>> {
        let row = sqlx::query(&format!("SELECT {BEAT_COLUMNS} FROM beats WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let beat = beat_from_row(&row)?;
        let licenses = self.licenses_for(beat.id).await?;
        Ok(Some(BeatWithLicenses { beat, licenses }))
    }

    async fn find_purchase_by_payment_reference(
        &self,
        reference: &str,
        buyer: Option<UserId>,
    ) -> Result<Option<Purchase>> {
        let row = match buyer {
            Some(buyer) => {
                sqlx::query(&format!(
                    "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE stripe_payment_id = ? AND buyer_id = ?"
                ))
                .bind(reference)
                .bind(buyer.get())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE stripe_payment_id = ?"
                ))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(purchase_from_row).transpose()
    }

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<InsertOutcome> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO purchases (buyer_id, beat_id, license_id, amount, status,
                                   stripe_payment_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(purchase.buyer_id.get())
        .bind(purchase.beat_id.get())
        .bind(purchase.license_id.get())
        .bind(purchase.amount.to_string())
        .bind(purchase.status.as_str())
        .bind(&purchase.stripe_payment_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(Purchase {
                id: PurchaseId(done.last_insert_rowid()),
                buyer_id: purchase.buyer_id,
                beat_id: purchase.beat_id,
                license_id: purchase.license_id,
                amount: purchase.amount,
                status: purchase.status,
                stripe_payment_id: purchase.stripe_payment_id,
                created_at: now,
                updated_at: now,
            })),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn library_for_buyer(&self, buyer: UserId) -> Result<Vec<LibraryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS purchase_id, p.license_id, p.amount, p.created_at AS purchased_at,
                   b.id AS beat_id, b.title, b.description, b.genre, b.bpm, b.musical_key,
                   b.audio_key, b.cover_image_key
            FROM purchases p
            INNER JOIN beats b ON b.id = p.beat_id
            WHERE p.buyer_id = ? AND p.status = 'completed'
            ORDER BY p.created_at DESC, p.id DESC
            "#,
        )
        .bind(buyer.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let purchased_at: DateTime<Utc> = row.try_get("purchased_at")?;
                Ok(LibraryEntry {
                    purchase_id: PurchaseId(row.try_get("purchase_id")?),
                    beat_id: BeatId(row.try_get("beat_id")?),
                    license_id: LicenseId(row.try_get("license_id")?),
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    genre: row.try_get("genre")?,
                    bpm: bpm(row)?,
                    musical_key: row.try_get("musical_key")?,
                    audio_key: row.try_get("audio_key")?,
                    cover_image_key: row.try_get("cover_image_key")?,
                    amount: decimal(row, "amount")?,
                    purchased_at,
                })
            })
            .collect()
    }

    async fn has_completed_purchase(&self, buyer: UserId, beat: BeatId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM purchases WHERE buyer_id = ? AND beat_id = ? AND status = 'completed'",
        )
        .bind(buyer.get())
        .bind(beat.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn draft(title: &str, price: Decimal) -> NewBeat {
        NewBeat {
            title: title.into(),
            description: Some("dark trap beat".into()),
            price,
            audio_key: format!("beats/1/{title}.wav"),
            cover_image_key: Some(format!("beats/1/{title}.png")),
            genre: Some("trap".into()),
            bpm: Some(140),
            musical_key: Some("Am".into()),
        }
    }

    fn purchase(reference: &str, beat: &BeatWithLicenses, buyer: i64) -> NewPurchase {
        NewPurchase {
            buyer_id: UserId(buyer),
            beat_id: beat.beat.id,
            license_id: beat.licenses[0].id,
            amount: dec!(19.99),
            status: PurchaseStatus::Completed,
            stripe_payment_id: reference.into(),
        }
    }

    async fn store_with_beat() -> (SqliteCatalogStore, BeatWithLicenses) {
        let store = SqliteCatalogStore::in_memory().await.unwrap();
        let beat = store
            .create_beat(
                UserId(1),
                draft("Night Drive", dec!(19.99)),
                vec![NewLicense::standard(dec!(19.99))],
            )
            .await
            .unwrap();
        (store, beat)
    }

    #[tokio::test]
    async fn test_beat_round_trip_keeps_decimal_precision() {
        let (store, created) = store_with_beat().await;

        let fetched = store.get_beat_with_licenses(created.beat.id).await.unwrap().unwrap();
        assert_eq!(fetched.beat.price, dec!(19.99));
        assert_eq!(fetched.beat.bpm, Some(140));
        assert!(fetched.beat.is_published);
        assert_eq!(fetched.licenses.len(), 1);
        assert_eq!(fetched.licenses[0].name, crate::model::STANDARD_LICENSE_NAME);
        assert_eq!(fetched.licenses[0].price.to_string(), "19.99");
    }

    #[tokio::test]
    async fn test_missing_beat() {
        let store = SqliteCatalogStore::in_memory().await.unwrap();
        assert!(store.get_beat_with_licenses(BeatId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_beat_requires_license() {
        let store = SqliteCatalogStore::in_memory().await.unwrap();
        let result = store.create_beat(UserId(1), draft("Lonely", dec!(5)), vec![]).await;
        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert!(store.list_published_beats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_newest_first() {
        let (store, first) = store_with_beat().await;
        let second = store
            .create_beat(UserId(2), draft("Sunrise", dec!(9.5)), vec![NewLicense::standard(dec!(9.5))])
            .await
            .unwrap();

        let listed = store.list_published_beats().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.beat.id);
        assert_eq!(listed[1].id, first.beat.id);
    }

    #[tokio::test]
    async fn test_unique_payment_reference() {
        let (store, beat) = store_with_beat().await;

        let first = store.insert_purchase(purchase("pi_abc", &beat, 5)).await.unwrap();
        let second = store.insert_purchase(purchase("pi_abc", &beat, 5)).await.unwrap();

        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert!(matches!(second, InsertOutcome::Duplicate));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let (store, beat) = store_with_beat().await;
        let store = Arc::new(store);
        let beat = Arc::new(beat);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let beat = beat.clone();
                tokio::spawn(async move { store.insert_purchase(purchase("pi_race", &beat, 5)).await })
            })
            .collect();

        let outcomes: Vec<InsertOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let inserted = outcomes
            .iter()
            .filter(|o| matches!(o, InsertOutcome::Inserted(_)))
            .count();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_find_purchase_scoped_by_buyer() {
        let (store, beat) = store_with_beat().await;
        store.insert_purchase(purchase("pi_scope", &beat, 5)).await.unwrap();

        let found = store
            .find_purchase_by_payment_reference("pi_scope", Some(UserId(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.amount, dec!(19.99));
        assert_eq!(found.status, PurchaseStatus::Completed);
        assert_eq!(found.stripe_payment_id, "pi_scope");

        assert!(store
            .find_purchase_by_payment_reference("pi_scope", Some(UserId(6)))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_purchase_by_payment_reference("pi_other", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_library_join() {
        let (store, beat) = store_with_beat().await;
        store.insert_purchase(purchase("pi_lib", &beat, 5)).await.unwrap();

        let library = store.library_for_buyer(UserId(5)).await.unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].title, "Night Drive");
        assert_eq!(library[0].amount, dec!(19.99));
        assert_eq!(library[0].bpm, Some(140));

        assert!(store.has_completed_purchase(UserId(5), beat.beat.id).await.unwrap());
        assert!(!store.has_completed_purchase(UserId(7), beat.beat.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_purchase_for_unknown_beat_is_rejected() {
        let (store, beat) = store_with_beat().await;
        let mut orphan = purchase("pi_orphan", &beat, 5);
        orphan.beat_id = BeatId(999);

        let result = store.insert_purchase(orphan).await;
        assert!(matches!(result, Err(CatalogError::Database(_))));
    }
}
