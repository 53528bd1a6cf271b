//! Mock Payment Gateway
//!
//! For testing and local development. Sessions live in memory and are
//! "paid" by calling `complete`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{CheckoutRequest, CheckoutSession, PaymentGateway, SessionSnapshot};
use crate::error::{PaymentError, Result};

/// Mock gateway with in-memory sessions
#[derive(Default)]
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, (CheckoutRequest, SessionSnapshot)>>,
    counter: AtomicU64,
    unavailable: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the provider were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Mark a session as paid with the given payment reference
    pub fn complete(&self, session_id: &str, payment_reference: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id) {
            Some((request, snapshot)) => {
                snapshot.payment_reference = Some(payment_reference.to_string());
                snapshot.amount_total = Some(request.unit_amount);
                snapshot.paid = true;
                true
            }
            None => false,
        }
    }

    /// Number of sessions created so far
    pub fn created_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The request a session was created from
    pub fn request(&self, session_id: &str) -> Option<CheckoutRequest> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|(request, _)| request.clone())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::Stripe("mock gateway unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        self.check_available()?;

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{n:04}");
        let snapshot = SessionSnapshot {
            id: id.clone(),
            payment_reference: None,
            amount_total: None,
            paid: false,
            metadata: request.metadata.clone(),
        };

        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), (request, snapshot));

        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.stripe.test/c/pay/{id}"),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        self.check_available()?;
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .map(|(_, snapshot)| snapshot.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
