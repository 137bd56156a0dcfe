//! In-process fakes for handler and pipeline tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stockinsight_ai::{InsightGenerator, LlmError, LlmProvider, LlmRouter};
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

use crate::state::AppState;

pub const ALICE: &str = "3f2b8c1e-9d4a-4f6b-8a2c-1e5d7f9b0c3a";
pub const BOB: &str = "8d1e4a2b-7c3f-4e5d-9a6b-2c8f1e0d3b7a";

pub fn user(raw: &str) -> UserId {
    UserId::parse(raw).expect("user")
}

pub struct OneListing;

impl DirectorySource for OneListing {
    fn load_segment<'a>(
        &'a self,
        segment: ExchangeSegment,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirectoryEntry>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(match segment {
                ExchangeSegment::Kospi => {
                    vec![DirectoryEntry::new("005930", "Samsung Electronics", segment)]
                }
                _ => Vec::new(),
            })
        })
    }
}

/// Quotes for codes with a known price; everything else is unknown.
pub struct PriceBoard(pub HashMap<&'static str, f64>);

impl QuoteProvider for PriceBoard {
    fn name(&self) -> &'static str {
        "board"
    }

    fn market(&self) -> Market {
        Market::Foreign
    }

    fn fetch_quote<'a>(
        &'a self,
        symbol: &'a CanonicalSymbol,
    ) -> Pin<Box<dyn Future<Output = Result<QuoteSnapshot, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            match self.0.get(symbol.code()) {
                Some(price) => Ok(QuoteSnapshot::new(symbol.clone(), *price, "USD")),
                None => Err(SourceError::not_found("unknown ticker")),
            }
        })
    }
}

pub struct JsonModel;

#[async_trait]
impl LlmProvider for JsonModel {
    fn vendor(&self) -> LlmVendor {
        LlmVendor::OpenAi
    }

    fn model(&self) -> &str {
        "gpt-test"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Ok(String::from(r#"{"recommendation": "buy", "risk_score": 4}"#))
    }
}

#[derive(Default)]
pub struct Ledger {
    pub payments: HashMap<String, PaymentRecord>,
    pub cancels: Vec<CancelRequest>,
    pub fail_cancels: bool,
}

/// Processor whose payments are scripted with [`FakeProcessor::pay`].
#[derive(Default)]
pub struct FakeProcessor(pub Mutex<Ledger>);

impl FakeProcessor {
    pub fn pay(&self, payment_id: &str, order_id: &str, amount: i64) {
        self.0.lock().expect("lock").payments.insert(
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
        self.0.lock().expect("lock").cancels.clone()
    }

    pub fn fail_cancels(&self) {
        self.0.lock().expect("lock").fail_cancels = true;
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
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
        self.0
            .lock()
            .expect("lock")
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| SourceError::not_found("no such payment"))
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        let mut ledger = self.0.lock().expect("lock");
        ledger.cancels.push(request.clone());
        if ledger.fail_cancels {
            return Err(SourceError::unavailable("processor offline"));
        }
        let payment = ledger
            .payments
            .get_mut(&request.payment_id)
            .ok_or_else(|| SourceError::not_found("no such payment"))?;
        payment.cancelled_amount += request.amount.unwrap_or(payment.amount);
        payment.status = PaymentStatus::Cancelled;
        Ok(CancelOutcome {
            payment_id: request.payment_id.clone(),
            cancelled_amount: payment.cancelled_amount,
        })
    }
}

pub struct Fixture {
    pub state: AppState,
    pub processor: Arc<FakeProcessor>,
}

/// Services backed by fakes: AAPL quotes at 190, every other foreign
/// ticker is unknown, and payments are `required` or optional.
pub fn fixture(required: bool) -> Fixture {
    let directory = Arc::new(MarketDirectory::new(
        Arc::new(OneListing),
        Duration::from_secs(3600),
    ));
    let resolver = Arc::new(SymbolResolver::new(directory));
    let board = Arc::new(PriceBoard(HashMap::from([("AAPL", 190.0)])));
    let quotes = Arc::new(QuoteService::new(board.clone(), board, Duration::from_secs(60)));
    let router = Arc::new(LlmRouter::new(
        LlmVendor::OpenAi,
        vec![Arc::new(JsonModel)],
        CircuitBreakerConfig::default(),
    ));
    let store: Arc<dyn InsightStore> =
        Arc::new(Warehouse::open(WarehouseConfig::in_memory()).expect("warehouse"));
    let generator = Arc::new(InsightGenerator::new(quotes, router, Arc::clone(&store)));

    let processor = Arc::new(FakeProcessor::default());
    let gate = Arc::new(PaymentGate::new(
        processor.clone(),
        PaymentGateConfig {
            price: 1000,
            product_name: String::from("Stock Deep Research"),
            required,
            expectation_ttl: Duration::from_secs(600),
            receipt_ttl: Duration::from_secs(600),
            refund_retry: RetryConfig::no_retry(),
        },
    ));

    Fixture {
        state: AppState::new(resolver, store, generator, gate, 100),
        processor,
    }
}
