//! Fakes shared by the cross-crate behavior tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stockinsight_ai::{InsightGenerator, LlmError, LlmErrorKind, LlmProvider, LlmRouter};
use stockinsight_core::{
    CanonicalSymbol, CircuitBreakerConfig, DirectoryEntry, DirectorySource, ExchangeSegment,
    LlmVendor, Market, MarketDirectory, PaymentVendor, QuoteProvider, QuoteService, QuoteSnapshot,
    RetryConfig, SourceError, SymbolResolver, UserId,
};
use stockinsight_payment::{
    CancelOutcome, CancelRequest, Checkout, OrderDraft, PaymentGate, PaymentGateConfig,
    PaymentProcessor, PaymentRecord, PaymentStatus,
};
use stockinsight_warehouse::{InsightStore, Warehouse, WarehouseConfig};
use stockinsight_web::AppState;

pub use std::sync::Arc;

pub const ALICE: &str = "3f2b8c1e-9d4a-4f6b-8a2c-1e5d7f9b0c3a";
pub const BOB: &str = "8d1e4a2b-7c3f-4e5d-9a6b-2c8f1e0d3b7a";
pub const PRICE: i64 = 1000;

pub fn user(raw: &str) -> UserId {
    UserId::parse(raw).expect("valid user id")
}

// =============================================================================
// Market directory
// =============================================================================

/// Directory source that counts segment loads and can be slowed down so
/// concurrent callers overlap.
pub struct CountingDirectory {
    entries: Vec<DirectoryEntry>,
    delay: Duration,
    loads: AtomicUsize,
}

impl CountingDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries,
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `load_segment` calls so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DirectorySource for CountingDirectory {
    fn load_segment<'a>(
        &'a self,
        segment: ExchangeSegment,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirectoryEntry>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self
                .entries
                .iter()
                .filter(|entry| entry.segment == segment)
                .cloned()
                .collect())
        })
    }
}

pub fn sample_listings() -> Vec<DirectoryEntry> {
    vec![
        DirectoryEntry::new("005930", "Samsung Electronics", ExchangeSegment::Kospi),
        DirectoryEntry::new("000660", "SK hynix", ExchangeSegment::Kospi),
        DirectoryEntry::new("035720", "Kakao", ExchangeSegment::Kospi),
        DirectoryEntry::new("247540", "Ecopro BM", ExchangeSegment::Kosdaq),
        DirectoryEntry::new("086520", "Ecopro", ExchangeSegment::Kosdaq),
    ]
}

// =============================================================================
// Quotes
// =============================================================================

/// Quote provider with fixed prices keyed by canonical code.
pub struct CountingQuotes {
    market: Market,
    prices: HashMap<String, f64>,
    calls: AtomicUsize,
}

impl CountingQuotes {
    pub fn new(market: Market, prices: &[(&str, f64)]) -> Self {
        Self {
            market,
            prices: prices
                .iter()
                .map(|(code, price)| ((*code).to_owned(), *price))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QuoteProvider for CountingQuotes {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn market(&self) -> Market {
        self.market
    }

    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a CanonicalSymbol,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSnapshot, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.prices.get(symbol.code()) {
                Some(price) => {
                    let currency = match self.market {
                        Market::Domestic => "KRW",
                        Market::Foreign => "USD",
                    };
                    Ok(QuoteSnapshot::new(symbol.clone(), *price, currency))
                }
                None => Err(SourceError::not_found(format!("no quote for {symbol}"))),
            }
        })
    }
}

// =============================================================================
// LLM
// =============================================================================

/// Model that replays scripted replies, then answers `{}` forever.
pub struct ScriptedModel {
    vendor: LlmVendor,
    replies: Mutex<VecDeque<Result<String, LlmErrorKind>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(vendor: LlmVendor, replies: Vec<Result<&str, LlmErrorKind>>) -> Self {
        Self {
            vendor,
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_owned))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with a valid buy recommendation.
    pub fn bullish(vendor: LlmVendor) -> Self {
        Self::new(vendor, Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn vendor(&self) -> LlmVendor {
        self.vendor
    }

    fn model(&self) -> &str {
        match self.vendor {
            LlmVendor::OpenAi => "gpt-scripted",
            LlmVendor::Anthropic => "claude-scripted",
        }
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().expect("replies lock").pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(kind)) => Err(LlmError::new(self.vendor, kind, "scripted failure")),
            None => Ok(String::from(
                r#"{"recommendation": "buy", "confidence_level": "high", "risk_score": 3}"#,
            )),
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Default)]
struct ProcessorLedger {
    payments: HashMap<String, PaymentRecord>,
    cancels: Vec<CancelRequest>,
}

/// Processor whose payments are scripted and whose cancels are recorded.
#[derive(Default)]
pub struct RecordingProcessor {
    ledger: Mutex<ProcessorLedger>,
}

impl RecordingProcessor {
    /// Records a paid payment as the processor would report it.
    pub fn pay(&self, payment_id: &str, order_id: &str, amount: i64) {
        self.ledger.lock().expect("ledger lock").payments.insert(
            payment_id.to_owned(),
            PaymentRecord {
                payment_id: payment_id.to_owned(),
                order_id: Some(order_id.to_owned()),
                amount,
                cancelled_amount: 0,
                status: PaymentStatus::Paid,
                pg_provider: Some(String::from("html5_inicis")),
                pay_method: Some(String::from("card")),
                paid_at: None,
            },
        );
    }

    pub fn cancels(&self) -> Vec<CancelRequest> {
        self.ledger.lock().expect("ledger lock").cancels.clone()
    }

    pub fn payment(&self, payment_id: &str) -> Option<PaymentRecord> {
        self.ledger
            .lock()
            .expect("ledger lock")
            .payments
            .get(payment_id)
            .cloned()
    }
}

#[async_trait]
impl PaymentProcessor for RecordingProcessor {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::PortOne
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn prepare(&self, draft: &OrderDraft) -> Result<Checkout, SourceError> {
        Ok(Checkout {
            order_id: draft.order_id.clone(),
            amount: draft.amount,
            product_name: draft.product_name.clone(),
            merchant_id: Some(String::from("imp00000000")),
            pg_provider: Some(String::from("html5_inicis")),
            channel_key: None,
            checkout_url: None,
            payment_id: None,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentRecord, SourceError> {
        self.payment(payment_id)
            .ok_or_else(|| SourceError::not_found(format!("no payment {payment_id}")))
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        let mut ledger = self.ledger.lock().expect("ledger lock");
        ledger.cancels.push(request.clone());
        let payment = ledger
            .payments
            .get_mut(&request.payment_id)
            .ok_or_else(|| SourceError::not_found("no such payment"))?;
        let amount = request.amount.unwrap_or(payment.amount - payment.cancelled_amount);
        payment.cancelled_amount += amount;
        if payment.cancelled_amount >= payment.amount {
            payment.status = PaymentStatus::Cancelled;
        }
        Ok(CancelOutcome {
            payment_id: request.payment_id.clone(),
            cancelled_amount: payment.cancelled_amount,
        })
    }
}

// =============================================================================
// Assembled services
// =============================================================================

/// Every service wired to fakes, with handles kept for assertions.
pub struct Harness {
    pub directory: Arc<CountingDirectory>,
    pub domestic_quotes: Arc<CountingQuotes>,
    pub foreign_quotes: Arc<CountingQuotes>,
    pub model: Arc<ScriptedModel>,
    pub processor: Arc<RecordingProcessor>,
    pub store: Arc<dyn InsightStore>,
    pub gate: Arc<PaymentGate>,
}

impl Harness {
    pub fn new(payment_required: bool) -> Self {
        Self::with_model(payment_required, ScriptedModel::bullish(LlmVendor::OpenAi))
    }

    pub fn with_model(payment_required: bool, model: ScriptedModel) -> Self {
        let store: Arc<dyn InsightStore> =
            Arc::new(Warehouse::open(WarehouseConfig::in_memory()).expect("warehouse"));
        let processor = Arc::new(RecordingProcessor::default());
        let gate = Arc::new(PaymentGate::new(
            processor.clone(),
            PaymentGateConfig {
                price: PRICE,
                product_name: String::from("Stock Deep Research"),
                required: payment_required,
                expectation_ttl: Duration::from_secs(1800),
                receipt_ttl: Duration::from_secs(1800),
                refund_retry: RetryConfig::no_retry(),
            },
        ));

        Self {
            directory: Arc::new(CountingDirectory::new(sample_listings())),
            domestic_quotes: Arc::new(CountingQuotes::new(
                Market::Domestic,
                &[("005930.KS", 71_500.0), ("247540.KQ", 182_000.0)],
            )),
            foreign_quotes: Arc::new(CountingQuotes::new(
                Market::Foreign,
                &[("AAPL", 190.0), ("MSFT", 415.0)],
            )),
            model: Arc::new(model),
            processor,
            store,
            gate,
        }
    }

    pub fn state(&self) -> AppState {
        let directory = Arc::new(MarketDirectory::new(
            self.directory.clone(),
            Duration::from_secs(3600),
        ));
        let resolver = Arc::new(SymbolResolver::new(directory));
        let quotes = Arc::new(QuoteService::new(
            self.domestic_quotes.clone(),
            self.foreign_quotes.clone(),
            Duration::from_secs(300),
        ));
        let router = Arc::new(LlmRouter::new(
            LlmVendor::OpenAi,
            vec![self.model.clone()],
            CircuitBreakerConfig::default(),
        ));
        let generator = Arc::new(InsightGenerator::new(
            quotes,
            router,
            Arc::clone(&self.store),
        ));

        AppState::new(resolver, Arc::clone(&self.store), generator, Arc::clone(&self.gate), 100)
    }
}
