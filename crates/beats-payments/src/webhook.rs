//! Stripe Webhook Handling
//!
//! Verifies webhook signatures and turns `checkout.session.completed`
//! events into purchase records, exactly once per payment reference.

use beats_catalog::{
    CatalogStore, InsertOutcome, NewPurchase, Purchase, PurchaseStatus, UserId,
};
use beats_catalog::{BeatId, LicenseId};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PaymentError, Result};
use crate::gateway::{
    from_minor_units, META_BEAT_ID, META_BUYER_ID, META_LEGACY_BUYER_ID, META_LICENSE_ID,
};

type HmacSha256 = Hmac<Sha256>;

/// Header Stripe puts the signature in
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// How far in the future a signature timestamp may be (clock skew)
const MAX_FUTURE_SKEW_SECS: i64 = 60;

// ============================================================================
// Signature verification
// ============================================================================

/// Verifies `Stripe-Signature` headers against the shared webhook secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify against the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify a `t=<unix>,v1=<hex>[,v1=<hex>...]` header over the raw body
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in header.split(',').map(str::trim) {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(sig) = part.strip_prefix("v1=") {
                candidates.push(sig);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
        if candidates.is_empty() {
            return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| PaymentError::WebhookSignature("invalid timestamp".into()))?;

        let age = now
            .checked_sub(timestamp)
            .ok_or_else(|| PaymentError::WebhookSignature("invalid timestamp".into()))?;
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if age > tolerance {
            return Err(PaymentError::WebhookSignature(format!(
                "timestamp too old ({age}s > {tolerance}s)"
            )));
        }
        if age < -MAX_FUTURE_SKEW_SECS {
            return Err(PaymentError::WebhookSignature("timestamp in the future".into()));
        }

        let mac = signed_payload_mac(&self.secret, timestamp_str, payload)?;

        // Stripe sends several v1 entries while a secret is being rolled
        let matched = candidates
            .iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|expected| mac.clone().verify_slice(&expected).is_ok());

        if matched {
            Ok(())
        } else {
            Err(PaymentError::WebhookSignature("signature mismatch".into()))
        }
    }
}

fn signed_payload_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Config("invalid webhook secret".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a valid `Stripe-Signature` header (for tests and local replay tooling)
pub fn signature_header(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let t = timestamp.to_string();
    match signed_payload_mac(secret, &t, payload) {
        Ok(mac) => format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes())),
        Err(_) => format!("t={t}"),
    }
}

// ============================================================================
// Event parsing
// ============================================================================

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<serde_json::Value>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
}

/// A completed checkout carrying beat metadata
#[derive(Clone, Debug)]
pub struct CompletedCheckout {
    pub event_id: String,
    pub session_id: String,

    /// Payment-intent id; the idempotency key for fulfillment
    pub payment_reference: Option<String>,

    /// Total charged in minor units
    pub amount_total: Option<i64>,

    pub metadata: BTreeMap<String, String>,
}

/// Ids recovered from checkout metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseMetadata {
    pub beat_id: BeatId,
    pub license_id: LicenseId,
    pub buyer_id: UserId,
}

impl CompletedCheckout {
    /// Parse the beat, license and buyer ids; all three must be integers
    pub fn purchase_metadata(&self) -> Result<PurchaseMetadata> {
        let field = |keys: &[&str]| -> Result<i64> {
            let (key, raw) = keys
                .iter()
                .find_map(|k| self.metadata.get(*k).map(|v| (*k, v)))
                .ok_or_else(|| PaymentError::InvalidMetadata(format!("missing {}", keys[0])))?;
            raw.trim()
                .parse()
                .map_err(|_| PaymentError::InvalidMetadata(format!("{key} '{raw}' is not numeric")))
        };

        Ok(PurchaseMetadata {
            beat_id: BeatId(field(&[META_BEAT_ID])?),
            license_id: LicenseId(field(&[META_LICENSE_ID])?),
            buyer_id: UserId(field(&[META_BUYER_ID, META_LEGACY_BUYER_ID])?),
        })
    }
}

/// Parsed webhook event
#[derive(Clone, Debug)]
pub enum WebhookEvent {
    /// Checkout for a beat completed - record the purchase
    CheckoutCompleted(CompletedCheckout),

    /// Checkout completed for something that is not a beat
    CheckoutWithoutBeat { session_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    /// Parse a raw webhook body (signature must already be verified)
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let event: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: RawCheckoutSession = serde_json::from_value(event.data.object)
                    .map_err(|e| PaymentError::WebhookParse(format!("invalid checkout session: {e}")))?;
                let metadata = session.metadata.unwrap_or_default();

                let has_beat = metadata
                    .get(META_BEAT_ID)
                    .is_some_and(|v| !v.trim().is_empty());
                if !has_beat {
                    return Ok(WebhookEvent::CheckoutWithoutBeat {
                        session_id: session.id,
                    });
                }

                Ok(WebhookEvent::CheckoutCompleted(CompletedCheckout {
                    event_id: event.id,
                    session_id: session.id,
                    payment_reference: session.payment_intent.as_ref().and_then(object_id),
                    amount_total: session.amount_total,
                    metadata,
                }))
            }
            _ => Ok(WebhookEvent::Other {
                event_type: event.event_type,
            }),
        }
    }

    fn kind(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCompleted(_) | WebhookEvent::CheckoutWithoutBeat { .. } => {
                "checkout.session.completed"
            }
            WebhookEvent::Other { event_type } => event_type,
        }
    }
}

/// Expandable fields arrive as an id string or as the expanded object
fn object_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// What a webhook delivery did
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// This delivery created the purchase
    Recorded { purchase: Purchase },

    /// The purchase already existed (redelivery or lost race)
    #[serde(rename_all = "camelCase")]
    Duplicate { payment_reference: String },

    /// Acknowledged without any write
    Ignored { reason: String },
}

/// Webhook reconciler: the single writer of purchase records
pub struct WebhookReconciler {
    verifier: WebhookVerifier,
    catalog: Arc<dyn CatalogStore>,
}

impl WebhookReconciler {
    pub fn new(verifier: WebhookVerifier, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { verifier, catalog }
    }

    /// Verify, parse and process one delivery
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let signature = signature
            .ok_or_else(|| PaymentError::WebhookSignature("missing Stripe-Signature header".into()))?;
        self.verifier.verify(payload, signature)?;

        let event = WebhookEvent::parse(payload)?;
        self.process(event).await
    }

    /// Process an already-verified event
    pub async fn process(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        tracing::info!(event_type = %event.kind(), "Processing Stripe webhook");

        match event {
            WebhookEvent::CheckoutCompleted(checkout) => self.fulfill(checkout).await,

            WebhookEvent::CheckoutWithoutBeat { session_id } => {
                tracing::debug!(session_id = %session_id, "Checkout without beat metadata");
                Ok(WebhookOutcome::Ignored {
                    reason: "checkout is not a beat purchase".into(),
                })
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("unhandled event type {event_type}"),
                })
            }
        }
    }

    async fn fulfill(&self, checkout: CompletedCheckout) -> Result<WebhookOutcome> {
        let ids = checkout.purchase_metadata().inspect_err(|e| {
            tracing::error!(
                session_id = %checkout.session_id,
                metadata = ?checkout.metadata,
                error = %e,
                "Invalid checkout metadata"
            );
        })?;

        let Some(reference) = checkout.payment_reference.clone() else {
            tracing::error!(session_id = %checkout.session_id, "Completed checkout has no payment intent");
            return Err(PaymentError::InvalidMetadata("missing payment_intent".into()));
        };

        if let Some(existing) = self
            .catalog
            .find_purchase_by_payment_reference(&reference, None)
            .await?
        {
            tracing::info!(
                purchase_id = %existing.id,
                payment_reference = %reference,
                "Purchase already recorded"
            );
            return Ok(WebhookOutcome::Duplicate {
                payment_reference: reference,
            });
        }

        let Some(beat) = self.catalog.get_beat_with_licenses(ids.beat_id).await? else {
            tracing::warn!(beat_id = %ids.beat_id, payment_reference = %reference, "Webhook for unknown beat");
            return Ok(WebhookOutcome::Ignored {
                reason: format!("unknown beat {}", ids.beat_id),
            });
        };
        if beat.license(ids.license_id).is_none() {
            tracing::warn!(
                beat_id = %ids.beat_id,
                license_id = %ids.license_id,
                payment_reference = %reference,
                "Webhook license does not belong to beat"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: format!("license {} does not belong to beat {}", ids.license_id, ids.beat_id),
            });
        }

        let amount = checkout
            .amount_total
            .map(from_minor_units)
            .unwrap_or(Decimal::ZERO);

        let outcome = self
            .catalog
            .insert_purchase(NewPurchase {
                buyer_id: ids.buyer_id,
                beat_id: ids.beat_id,
                license_id: ids.license_id,
                amount,
                status: PurchaseStatus::Completed,
                stripe_payment_id: reference.clone(),
            })
            .await?;

        match outcome {
            InsertOutcome::Inserted(purchase) => {
                tracing::info!(
                    purchase_id = %purchase.id,
                    beat_id = %purchase.beat_id,
                    buyer = %purchase.buyer_id,
                    amount = %purchase.amount,
                    payment_reference = %reference,
                    "Recorded purchase"
                );
                Ok(WebhookOutcome::Recorded { purchase })
            }
            InsertOutcome::Duplicate => {
                tracing::info!(payment_reference = %reference, "Concurrent delivery already recorded purchase");
                Ok(WebhookOutcome::Duplicate {
                    payment_reference: reference,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beats_catalog::{MemoryCatalogStore, NewBeat, NewLicense, SqliteCatalogStore};
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, Duration::from_secs(300))
    }

    fn completed_event(payment_intent: &str, metadata: serde_json::Value, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "object": "checkout.session",
                    "payment_intent": payment_intent,
                    "amount_total": amount,
                    "metadata": metadata,
                }
            }
        }))
        .unwrap()
    }

    fn signed(payload: &[u8]) -> String {
        signature_header(SECRET, payload, Utc::now().timestamp())
    }

    fn draft() -> NewBeat {
        NewBeat {
            title: "Night Drive".into(),
            description: None,
            price: dec!(19.99),
            audio_key: "beats/1/night-drive.wav".into(),
            cover_image_key: None,
            genre: None,
            bpm: None,
            musical_key: None,
        }
    }

    async fn memory_setup() -> (Arc<MemoryCatalogStore>, Arc<WebhookReconciler>, BeatId, LicenseId) {
        let catalog = Arc::new(MemoryCatalogStore::new());
        let beat = catalog
            .create_beat(UserId(1), draft(), vec![NewLicense::standard(dec!(19.99))])
            .await
            .unwrap();
        let reconciler = Arc::new(WebhookReconciler::new(verifier(), catalog.clone()));
        (catalog, reconciler, beat.beat.id, beat.licenses[0].id)
    }

    fn beat_metadata(beat: BeatId, license: LicenseId, buyer: &str) -> serde_json::Value {
        json!({
            "beatId": beat.to_string(),
            "licenseId": license.to_string(),
            "buyerId": buyer,
        })
    }

    // ---- signatures -------------------------------------------------------

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = signature_header(SECRET, payload, now);
        assert!(verifier().verify_at(payload, &header, now).is_ok());
    }

    #[test]
    fn test_wrong_secret() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = Utc::now().timestamp();
        let header = signature_header("whsec_wrong", payload, now);
        assert!(matches!(
            verifier().verify_at(payload, &header, now),
            Err(PaymentError::WebhookSignature(_))
        ));
    }

    #[test]
    fn test_modified_payload() {
        let now = Utc::now().timestamp();
        let header = signature_header(SECRET, br#"{"amount":1}"#, now);
        assert!(verifier().verify_at(br#"{"amount":2}"#, &header, now).is_err());
    }

    #[test]
    fn test_stale_and_future_timestamps() {
        let payload = b"{}";
        let now = Utc::now().timestamp();

        let old = signature_header(SECRET, payload, now - 600);
        assert!(verifier().verify_at(payload, &old, now).is_err());

        let future = signature_header(SECRET, payload, now + 120);
        assert!(verifier().verify_at(payload, &future, now).is_err());

        let slight_skew = signature_header(SECRET, payload, now + 30);
        assert!(verifier().verify_at(payload, &slight_skew, now).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        for header in ["", "garbage", "t=abc,v1=00", &format!("t={now}"), "v1=deadbeef"] {
            assert!(verifier().verify_at(payload, header, now).is_err(), "accepted {header:?}");
        }
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=00");
            assert!(matches!(
                verifier().verify_at(payload, &header, now),
                Err(PaymentError::WebhookSignature(_))
            ));
        }
        let header = format!("t={},v1=00", i64::MIN);
        assert!(verifier().verify_at(payload, &header, i64::MAX).is_err());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let now = Utc::now().timestamp();
        let good = signature_header(SECRET, payload, now);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={now},v1=not-hex,v1={},v1={good_sig}", "0".repeat(64));
        assert!(verifier().verify_at(payload, &header, now).is_ok());
    }

    // ---- parsing ----------------------------------------------------------

    #[test]
    fn test_parse_beat_checkout() {
        let payload = completed_event("pi_abc", json!({"beatId": "42", "licenseId": "7", "buyerId": "5"}), 1999);
        let WebhookEvent::CheckoutCompleted(checkout) = WebhookEvent::parse(&payload).unwrap() else {
            panic!("expected a beat checkout");
        };
        assert_eq!(checkout.payment_reference.as_deref(), Some("pi_abc"));
        assert_eq!(checkout.amount_total, Some(1999));
        assert_eq!(
            checkout.purchase_metadata().unwrap(),
            PurchaseMetadata {
                beat_id: BeatId(42),
                license_id: LicenseId(7),
                buyer_id: UserId(5),
            }
        );
    }

    #[test]
    fn test_parse_legacy_user_id_key() {
        let payload = completed_event("pi_abc", json!({"beatId": "42", "licenseId": "7", "userId": "9"}), 1999);
        let WebhookEvent::CheckoutCompleted(checkout) = WebhookEvent::parse(&payload).unwrap() else {
            panic!("expected a beat checkout");
        };
        assert_eq!(checkout.purchase_metadata().unwrap().buyer_id, UserId(9));
    }

    #[test]
    fn test_parse_expanded_payment_intent() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_2",
                "payment_intent": {"id": "pi_expanded", "object": "payment_intent"},
                "metadata": {"beatId": "1", "licenseId": "2", "buyerId": "3"}
            }}
        }))
        .unwrap();
        let WebhookEvent::CheckoutCompleted(checkout) = WebhookEvent::parse(&payload).unwrap() else {
            panic!("expected a beat checkout");
        };
        assert_eq!(checkout.payment_reference.as_deref(), Some("pi_expanded"));
        assert_eq!(checkout.amount_total, None);
    }

    #[test]
    fn test_parse_non_beat_and_other_events() {
        let payload = completed_event("pi_abc", json!({"plan": "pro"}), 2900);
        assert!(matches!(
            WebhookEvent::parse(&payload).unwrap(),
            WebhookEvent::CheckoutWithoutBeat { .. }
        ));

        for blank in ["", "   "] {
            let payload = completed_event("pi_abc", json!({"beatId": blank, "licenseId": "7"}), 2900);
            assert!(matches!(
                WebhookEvent::parse(&payload).unwrap(),
                WebhookEvent::CheckoutWithoutBeat { .. }
            ));
        }

        let payload = br#"{"id":"evt","type":"invoice.paid","data":{"object":{}}}"#;
        assert!(matches!(
            WebhookEvent::parse(payload).unwrap(),
            WebhookEvent::Other { event_type } if event_type == "invoice.paid"
        ));

        assert!(matches!(
            WebhookEvent::parse(b"not json"),
            Err(PaymentError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_non_numeric_metadata() {
        let payload = completed_event("pi_abc", json!({"beatId": "forty-two", "licenseId": "7", "buyerId": "5"}), 1999);
        let WebhookEvent::CheckoutCompleted(checkout) = WebhookEvent::parse(&payload).unwrap() else {
            panic!("expected a beat checkout");
        };
        assert!(matches!(
            checkout.purchase_metadata(),
            Err(PaymentError::InvalidMetadata(_))
        ));
    }

    // ---- reconciliation ---------------------------------------------------

    #[tokio::test]
    async fn test_records_purchase_once_across_redeliveries() {
        let (catalog, reconciler, beat, license) = memory_setup().await;
        let payload = completed_event("pi_abc", beat_metadata(beat, license, "5"), 1999);

        let first = reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
        let WebhookOutcome::Recorded { purchase } = first else {
            panic!("first delivery should record");
        };
        assert_eq!(purchase.amount, dec!(19.99));
        assert_eq!(purchase.status, PurchaseStatus::Completed);
        assert_eq!(purchase.buyer_id, UserId(5));

        for _ in 0..3 {
            let again = reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
            assert!(matches!(again, WebhookOutcome::Duplicate { .. }));
        }
        assert_eq!(catalog.purchase_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_record_once() {
        let (catalog, reconciler, beat, license) = memory_setup().await;
        let payload = Arc::new(completed_event("pi_parallel", beat_metadata(beat, license, "5"), 1999));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let reconciler = reconciler.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    let header = signed(&payload);
                    reconciler.handle(&payload, Some(&header)).await
                })
            })
            .collect();

        let mut recorded = 0;
        for result in futures::future::join_all(tasks).await {
            match result.unwrap().unwrap() {
                WebhookOutcome::Recorded { .. } => recorded += 1,
                WebhookOutcome::Duplicate { .. } => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(recorded, 1);
        assert_eq!(catalog.purchase_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_writes_nothing() {
        let (catalog, reconciler, beat, license) = memory_setup().await;
        let payload = completed_event("pi_forged", beat_metadata(beat, license, "5"), 1999);
        let forged = signature_header("whsec_attacker", &payload, Utc::now().timestamp());

        assert!(matches!(
            reconciler.handle(&payload, Some(&forged)).await,
            Err(PaymentError::WebhookSignature(_))
        ));
        assert!(matches!(
            reconciler.handle(&payload, None).await,
            Err(PaymentError::WebhookSignature(_))
        ));
        assert_eq!(catalog.purchase_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_numeric_metadata_is_an_error() {
        let (catalog, reconciler, beat, license) = memory_setup().await;
        let payload = completed_event("pi_bad", beat_metadata(beat, license, "five"), 1999);

        let result = reconciler.handle(&payload, Some(&signed(&payload))).await;
        assert!(matches!(result, Err(PaymentError::InvalidMetadata(_))));
        assert_eq!(catalog.purchase_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_beat_and_foreign_license_are_ignored() {
        let (catalog, reconciler, beat, license) = memory_setup().await;

        let payload = completed_event("pi_ghost", beat_metadata(BeatId(9999), license, "5"), 1999);
        let outcome = reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

        let payload = completed_event("pi_mismatch", beat_metadata(beat, LicenseId(9999), "5"), 1999);
        let outcome = reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

        assert_eq!(catalog.purchase_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_events_are_acknowledged() {
        let (catalog, reconciler, _, _) = memory_setup().await;
        let payload = br#"{"id":"evt","type":"customer.subscription.updated","data":{"object":{"id":"sub_1"}}}"#;

        let outcome = reconciler.handle(payload, Some(&signed(payload))).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(catalog.purchase_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_beat_42_license_7() {
        let store = SqliteCatalogStore::in_memory().await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO beats (id, title, price, audio_key, seller_id, is_published, created_at, updated_at)
             VALUES (42, 'Night Drive', '19.99', 'beats/1/a.wav', 1, 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO licenses (id, beat_id, name, price, terms, created_at, updated_at)
             VALUES (7, 42, 'Basic', '19.99', 'terms', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(store.pool())
        .await
        .unwrap();

        let store = Arc::new(store);
        let reconciler = WebhookReconciler::new(verifier(), store.clone());
        let payload = completed_event("pi_abc", json!({"beatId": "42", "licenseId": "7", "buyerId": "5"}), 1999);

        reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
        let redelivered = reconciler.handle(&payload, Some(&signed(&payload))).await.unwrap();
        assert!(matches!(redelivered, WebhookOutcome::Duplicate { .. }));

        let purchase = store
            .find_purchase_by_payment_reference("pi_abc", None)
            .await
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&purchase).unwrap();
        assert_eq!(json["beatId"], 42);
        assert_eq!(json["licenseId"], 7);
        assert_eq!(json["userId"], 5);
        assert_eq!(json["amount"], "19.99");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["stripePaymentId"], "pi_abc");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
