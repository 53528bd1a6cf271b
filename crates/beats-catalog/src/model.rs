//! Domain Models
//!
//! Beats, their licenses, and the purchase records that fulfill them.
//! All money is `rust_decimal::Decimal` with two decimal places.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

id_type!(
    /// Beat primary key
    BeatId
);
id_type!(
    /// License primary key
    LicenseId
);
id_type!(
    /// Purchase primary key
    PurchaseId
);
id_type!(
    /// Account id of a buyer or seller
    UserId
);

/// Name given to the license created alongside every new beat
pub const STANDARD_LICENSE_NAME: &str = "Standard License";

const STANDARD_LICENSE_DESCRIPTION: &str = "Standard license for personal and commercial use";

const STANDARD_LICENSE_TERMS: &str = "This license allows you to use the beat for personal and \
commercial projects. You may not resell or redistribute the beat.";

/// A beat listed on the marketplace
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    pub id: BeatId,
    pub title: String,
    pub description: Option<String>,

    /// List price; the license price is what actually gets charged
    pub price: Decimal,

    /// Object key of the audio file in the blob store
    pub audio_key: String,

    /// Object key of the cover image, if any
    pub cover_image_key: Option<String>,

    pub genre: Option<String>,
    pub bpm: Option<u32>,

    /// Musical key (e.g. "Am", "F#")
    pub musical_key: Option<String>,

    /// Account that uploaded the beat
    pub seller_id: UserId,

    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Usage terms and price for a beat
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: LicenseId,
    pub beat_id: BeatId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub terms: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A beat together with its licenses, ordered by id
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatWithLicenses {
    #[serde(flatten)]
    pub beat: Beat,
    pub licenses: Vec<License>,
}

impl BeatWithLicenses {
    /// The license checkout sells when the buyer makes no choice
    pub fn basic_license(&self) -> Option<&License> {
        self.licenses.first()
    }

    /// Find a license, but only if it belongs to this beat
    pub fn license(&self, id: LicenseId) -> Option<&License> {
        self.licenses.iter().find(|l| l.id == id)
    }
}

/// Input for publishing a beat
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBeat {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    pub audio_key: String,
    #[serde(default)]
    pub cover_image_key: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub bpm: Option<u32>,
    #[serde(default, alias = "key")]
    pub musical_key: Option<String>,
}

impl NewBeat {
    /// Reject drafts the store must never see
    pub fn validate(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CatalogError::Validation("Title is required".into()));
        }
        if title.chars().count() > 255 {
            return Err(CatalogError::Validation("Title must be at most 255 characters".into()));
        }
        validate_price(self.price)?;
        if self.audio_key.trim().is_empty() {
            return Err(CatalogError::Validation("Audio file is required".into()));
        }
        if let Some(bpm) = self.bpm {
            if !(1..=999).contains(&bpm) {
                return Err(CatalogError::Validation("BPM must be between 1 and 999".into()));
            }
        }
        if self.genre.as_deref().is_some_and(|g| g.chars().count() > 50) {
            return Err(CatalogError::Validation("Genre must be at most 50 characters".into()));
        }
        if self.musical_key.as_deref().is_some_and(|k| k.chars().count() > 10) {
            return Err(CatalogError::Validation("Key must be at most 10 characters".into()));
        }
        Ok(())
    }
}

/// Input for attaching a license to a beat
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLicense {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub terms: String,
}

impl NewLicense {
    /// The default license every uploaded beat starts with
    pub fn standard(price: Decimal) -> Self {
        Self {
            name: STANDARD_LICENSE_NAME.into(),
            description: Some(STANDARD_LICENSE_DESCRIPTION.into()),
            price,
            terms: STANDARD_LICENSE_TERMS.into(),
        }
    }
}

/// Prices are positive with at most two decimal places
pub fn validate_price(price: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(CatalogError::Validation("Price must be greater than zero".into()));
    }
    if price.normalize().scale() > 2 {
        return Err(CatalogError::Validation("Price must have at most two decimal places".into()));
    }
    Ok(())
}

/// Fulfillment state of a purchase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            other => Err(CatalogError::Corrupt(format!("unknown purchase status '{other}'"))),
        }
    }
}

/// A durable record that a buyer owns a license to a beat
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: PurchaseId,
    #[serde(rename = "userId")]
    pub buyer_id: UserId,
    pub beat_id: BeatId,
    pub license_id: LicenseId,

    /// Amount actually charged, independent of later price edits
    pub amount: Decimal,

    pub status: PurchaseStatus,

    /// Stripe payment-intent id; unique across all purchases
    pub stripe_payment_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for recording a purchase
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchase {
    #[serde(rename = "userId")]
    pub buyer_id: UserId,
    pub beat_id: BeatId,
    pub license_id: LicenseId,
    pub amount: Decimal,
    pub status: PurchaseStatus,
    pub stripe_payment_id: String,
}

/// Result of an insert guarded by the payment-reference uniqueness constraint
#[derive(Clone, Debug)]
pub enum InsertOutcome {
    /// This call created the row
    Inserted(Purchase),

    /// A row with the same payment reference already exists
    Duplicate,
}

/// One row of a buyer's library: a purchase joined to its beat
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub purchase_id: PurchaseId,
    pub beat_id: BeatId,
    pub license_id: LicenseId,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<u32>,
    pub musical_key: Option<String>,
    pub audio_key: String,
    pub cover_image_key: Option<String>,
    pub amount: Decimal,
    pub purchased_at: DateTime<Utc>,
}
