//! Server-held payment state: pending expectations and verified receipts.
//!
//! Both are short-lived, owned by one user, and consumed at most once.
//! Expired entries are invisible. They are reclaimed on every write and
//! handed back to the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use stockinsight_core::{Timeframe, UserId};
use tokio::sync::Mutex;

/// Keyed entries that belong to a user and expire after a fixed TTL.
struct Ledger<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    owner: UserId,
    expires_at: Instant,
}

impl<V: Clone> Ledger<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Stores `value` and returns whatever had expired in the meantime.
    async fn insert(&self, key: String, owner: UserId, value: V) -> Vec<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired = drain_expired(&mut entries, now);
        entries.insert(
            key,
            Entry {
                value,
                owner,
                expires_at: now + self.ttl,
            },
        );
        expired
    }

    async fn reclaim(&self) -> Vec<V> {
        drain_expired(&mut *self.entries.lock().await, Instant::now())
    }

    async fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().await.remove(key).map(|entry| entry.value)
    }

    /// Live entry owned by `owner`; anything else reads as absent.
    async fn get(&self, key: &str, owner: &UserId) -> Option<V> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|entry| entry.expires_at > now && &entry.owner == owner)
            .map(|entry| entry.value.clone())
    }

    /// Removes and returns the entry when it is live, owned by `owner`, and
    /// accepted by `matches`. A rejected entry stays in place.
    async fn take_if<F>(&self, key: &str, owner: &UserId, matches: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let usable = entries.get(key).is_some_and(|entry| {
            entry.expires_at > now && &entry.owner == owner && matches(&entry.value)
        });
        if usable {
            entries.remove(key).map(|entry| entry.value)
        } else {
            None
        }
    }

    async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

fn drain_expired<V>(entries: &mut HashMap<String, Entry<V>>, now: Instant) -> Vec<V> {
    let keys: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.expires_at <= now)
        .map(|(key, _)| key.clone())
        .collect();
    keys.into_iter()
        .filter_map(|key| entries.remove(&key))
        .map(|entry| entry.value)
        .collect()
}

/// What a pending order should amount to once paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentExpectation {
    pub order_id: String,
    pub expected_amount: i64,
    pub stock_code: String,
    pub timeframe: Timeframe,
    pub user_id: UserId,
}

pub struct ExpectationStore {
    ledger: Ledger<PaymentExpectation>,
}

impl ExpectationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ledger: Ledger::new(ttl),
        }
    }

    /// Unpaid expectations simply lapse.
    pub async fn save(&self, expectation: PaymentExpectation) {
        self.ledger
            .insert(
                expectation.order_id.clone(),
                expectation.user_id.clone(),
                expectation,
            )
            .await;
    }

    /// Whether `order_id` is a live order placed by `user_id`.
    pub async fn is_owned_by(&self, order_id: &str, user_id: &UserId) -> bool {
        self.ledger.get(order_id, user_id).await.is_some()
    }

    /// Expectation for `order_id` if it is live and belongs to `user_id`.
    pub async fn get(&self, order_id: &str, user_id: &UserId) -> Option<PaymentExpectation> {
        self.ledger.get(order_id, user_id).await
    }

    /// Consumes the expectation. Only one caller can ever succeed.
    pub async fn consume(&self, order_id: &str, user_id: &UserId) -> Option<PaymentExpectation> {
        self.ledger.take_if(order_id, user_id, |_| true).await
    }

    pub async fn pending(&self) -> usize {
        self.ledger.len().await
    }
}

/// Proof of one verified payment, redeemable for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
    pub stock_code: String,
    pub timeframe: Timeframe,
    pub user_id: UserId,
}

pub struct ReceiptBook {
    ledger: Ledger<Receipt>,
}

impl ReceiptBook {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ledger: Ledger::new(ttl),
        }
    }

    /// Issues `receipt` and returns receipts that expired unredeemed.
    pub async fn issue(&self, receipt: Receipt) -> Vec<Receipt> {
        self.ledger
            .insert(receipt.payment_id.clone(), receipt.user_id.clone(), receipt)
            .await
    }

    /// The live receipt for `payment_id` issued to `user_id` for the same
    /// stock and timeframe, left in place.
    pub async fn find(
        &self,
        payment_id: &str,
        user_id: &UserId,
        stock_code: &str,
        timeframe: Timeframe,
    ) -> Option<Receipt> {
        self.ledger
            .get(payment_id, user_id)
            .await
            .filter(|receipt| receipt.covers(stock_code, timeframe))
    }

    /// Redeems the receipt for `payment_id` when it was issued to `user_id`
    /// for the same stock and timeframe.
    pub async fn redeem(
        &self,
        payment_id: &str,
        user_id: &UserId,
        stock_code: &str,
        timeframe: Timeframe,
    ) -> Option<Receipt> {
        self.ledger
            .take_if(payment_id, user_id, |receipt| {
                receipt.covers(stock_code, timeframe)
            })
            .await
    }

    /// Withdraws the receipt for `payment_id`, live or not.
    pub async fn revoke(&self, payment_id: &str) -> Option<Receipt> {
        self.ledger.remove(payment_id).await
    }

    /// Removes and returns every receipt that expired unredeemed.
    pub async fn take_expired(&self) -> Vec<Receipt> {
        self.ledger.reclaim().await
    }
}

impl Receipt {
    fn covers(&self, stock_code: &str, timeframe: Timeframe) -> bool {
        self.stock_code.eq_ignore_ascii_case(stock_code.trim()) && self.timeframe == timeframe
    }
}

/// Which user a verified payment belongs to. Outlives the receipt so
/// the payer can still look up or cancel the payment afterwards.
pub struct PaymentOwners {
    ledger: Ledger<String>,
}

impl PaymentOwners {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ledger: Ledger::new(ttl),
        }
    }

    pub async fn record(&self, payment_id: &str, order_id: &str, user_id: &UserId) {
        self.ledger
            .insert(payment_id.to_owned(), user_id.clone(), order_id.to_owned())
            .await;
    }

    pub async fn is_owned_by(&self, payment_id: &str, user_id: &UserId) -> bool {
        self.ledger.get(payment_id, user_id).await.is_some()
    }
}
