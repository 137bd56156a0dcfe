//! Lemon Squeezy adapter.
//!
//! The checkout id doubles as the payment id: the order created when the
//! buyer completes a checkout is looked up by that id, and our order id
//! travels in the checkout's custom data.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use stockinsight_core::{
    HttpAuth, HttpClient, HttpRequest, LemonSqueezyConfig, PaymentVendor, SourceError,
    UtcDateTime,
};

use crate::processor::{
    status_error, CancelOutcome, CancelRequest, Checkout, OrderDraft, PaymentProcessor,
    PaymentRecord, PaymentStatus,
};

const LEMONSQUEEZY_BASE_URL: &str = "https://api.lemonsqueezy.com/v1";
const JSON_API: &str = "application/vnd.api+json";
const REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    attributes: A,
}

#[derive(Debug, Deserialize)]
struct CheckoutAttributes {
    url: Option<String>,
    #[serde(default)]
    checkout_data: CheckoutData,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutData {
    #[serde(default)]
    custom: Value,
}

#[derive(Debug, Deserialize)]
struct OrderAttributes {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: i64,
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    refunded_amount: i64,
    created_at: Option<String>,
}

impl OrderAttributes {
    fn status(&self) -> PaymentStatus {
        if self.refunded {
            return PaymentStatus::Cancelled;
        }
        match self.status.as_str() {
            "pending" => PaymentStatus::Ready,
            "paid" | "partial_refund" => PaymentStatus::Paid,
            "refunded" => PaymentStatus::Cancelled,
            "failed" | "fraudulent" => PaymentStatus::Failed,
            _ => PaymentStatus::Unknown,
        }
    }

    fn cancelled_amount(&self) -> i64 {
        if self.refunded && self.refunded_amount == 0 {
            self.total
        } else {
            self.refunded_amount
        }
    }
}

pub struct LemonSqueezyProcessor {
    http_client: Arc<dyn HttpClient>,
    config: LemonSqueezyConfig,
    base_url: String,
}

impl LemonSqueezyProcessor {
    pub fn new(http_client: Arc<dyn HttpClient>, config: LemonSqueezyConfig) -> Self {
        Self {
            http_client,
            config,
            base_url: String::from(LEMONSQUEEZY_BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        request
            .with_auth(&HttpAuth::BearerToken(self.config.api_key.clone()))
            .with_header("accept", JSON_API)
            .with_timeout_ms(REQUEST_TIMEOUT_MS)
    }

    async fn send<T>(&self, request: HttpRequest, what: &str) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        if !self.is_configured() {
            return Err(SourceError::not_configured("Lemon Squeezy credentials are not set"));
        }

        let response = self
            .http_client
            .execute(self.request(request))
            .await
            .map_err(|error| {
                SourceError::unavailable(format!("lemonsqueezy {what} request failed: {error}"))
            })?;
        if !response.is_success() {
            return Err(status_error(PaymentVendor::LemonSqueezy, &response));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            SourceError::internal(format!("malformed lemonsqueezy {what} payload: {e}"))
        })
    }

    fn json_body(request: HttpRequest, body: &Value) -> HttpRequest {
        request
            .with_json(body)
            .with_header("content-type", JSON_API)
    }

    async fn order_for_checkout(
        &self,
        checkout_id: &str,
    ) -> Result<Option<Resource<OrderAttributes>>, SourceError> {
        let request = HttpRequest::get(format!("{}/orders", self.base_url))
            .with_query(&[("filter[checkout_id]", checkout_id)]);
        let orders: Document<Vec<Resource<OrderAttributes>>> =
            self.send(request, "order lookup").await?;
        Ok(orders.data.into_iter().next())
    }
}

#[async_trait]
impl PaymentProcessor for LemonSqueezyProcessor {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::LemonSqueezy
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
            && !self.config.store_id.is_empty()
            && !self.config.variant_id.is_empty()
    }

    async fn prepare(&self, draft: &OrderDraft) -> Result<Checkout, SourceError> {
        let payload = json!({
            "data": {
                "type": "checkouts",
                "attributes": {
                    "custom_price": draft.amount,
                    "checkout_options": { "embed": false, "media": true, "logo": true },
                    "checkout_data": {
                        "custom": {
                            "merchant_uid": draft.order_id,
                            "stock_code": draft.stock_code,
                            "timeframe": draft.timeframe.as_str(),
                            "user_id": draft.user_id.as_str(),
                        }
                    },
                    "product_options": { "name": draft.product_name },
                },
                "relationships": {
                    "store": { "data": { "type": "stores", "id": self.config.store_id } },
                    "variant": { "data": { "type": "variants", "id": self.config.variant_id } },
                }
            }
        });

        let request = Self::json_body(
            HttpRequest::post(format!("{}/checkouts", self.base_url)),
            &payload,
        );
        let checkout: Document<Resource<CheckoutAttributes>> =
            self.send(request, "checkout").await?;
        let Some(url) = checkout.data.attributes.url else {
            return Err(SourceError::internal("lemonsqueezy checkout has no url"));
        };
        info!("lemonsqueezy checkout {} for {}", checkout.data.id, draft.order_id);

        Ok(Checkout {
            order_id: draft.order_id.clone(),
            amount: draft.amount,
            product_name: draft.product_name.clone(),
            merchant_id: Some(self.config.store_id.clone()),
            pg_provider: Some(String::from(PaymentVendor::LemonSqueezy.as_str())),
            channel_key: None,
            checkout_url: Some(url),
            payment_id: Some(checkout.data.id),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentRecord, SourceError> {
        let request = HttpRequest::get(format!("{}/checkouts/{}", self.base_url, payment_id));
        let checkout: Document<Resource<CheckoutAttributes>> =
            self.send(request, "checkout lookup").await?;
        let order_id = checkout
            .data
            .attributes
            .checkout_data
            .custom
            .get("merchant_uid")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let mut record = PaymentRecord {
            payment_id: payment_id.to_owned(),
            order_id,
            amount: 0,
            cancelled_amount: 0,
            status: PaymentStatus::Ready,
            pg_provider: Some(String::from(PaymentVendor::LemonSqueezy.as_str())),
            pay_method: None,
            paid_at: None,
        };

        if let Some(order) = self.order_for_checkout(payment_id).await? {
            let attributes = order.attributes;
            record.status = attributes.status();
            record.amount = attributes.total;
            record.cancelled_amount = attributes.cancelled_amount();
            record.paid_at = attributes
                .created_at
                .as_deref()
                .and_then(|created| UtcDateTime::parse(created).ok());
        }
        Ok(record)
    }

    async fn cancel(&self, request: &CancelRequest) -> Result<CancelOutcome, SourceError> {
        let Some(order) = self.order_for_checkout(&request.payment_id).await? else {
            return Err(SourceError::not_found(format!(
                "no order for checkout {}",
                request.payment_id
            )));
        };

        let already = order.attributes.cancelled_amount();
        let remaining = (order.attributes.total - already).max(0);
        if order.attributes.status() == PaymentStatus::Cancelled || remaining == 0 {
            info!("lemonsqueezy order {} is already refunded", order.id);
            return Ok(CancelOutcome {
                payment_id: request.payment_id.clone(),
                cancelled_amount: already,
            });
        }

        let amount = request.amount.unwrap_or(remaining).min(remaining);
        let payload = json!({
            "data": {
                "type": "refunds",
                "attributes": { "amount": amount },
                "relationships": {
                    "order": { "data": { "type": "orders", "id": order.id } }
                }
            }
        });
        let http_request =
            Self::json_body(HttpRequest::post(format!("{}/refunds", self.base_url)), &payload);
        let refund: Document<Value> = self.send(http_request, "refund").await?;
        if refund.data.get("id").is_none() {
            warn!("lemonsqueezy refund for order {} returned no id", order.id);
        }

        info!(
            "lemonsqueezy refunded {amount} on order {} ({})",
            order.id, request.reason
        );
        Ok(CancelOutcome {
            payment_id: request.payment_id.clone(),
            cancelled_amount: already + amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockinsight_core::{CannedHttpClient, Timeframe, UserId};

    fn config() -> LemonSqueezyConfig {
        LemonSqueezyConfig {
            api_key: String::from("ls_key"),
            store_id: String::from("1"),
            variant_id: String::from("2"),
        }
    }

    const CHECKOUT: &str = r#"{"data":{"id":"chk_1","attributes":{"url":"https://pay.example/chk_1","checkout_data":{"custom":{"merchant_uid":"insight_9"}}}}}"#;

    fn order(status: &str, refunded: bool, refunded_amount: i64) -> String {
        format!(
            r#"{{"data":[{{"id":"77","attributes":{{"status":"{status}","total":1000,"refunded":{refunded},"refunded_amount":{refunded_amount},"created_at":"2026-10-01T09:30:00.000000Z"}}}}]}}"#
        )
    }

    #[tokio::test]
    async fn prepare_sends_order_metadata_and_returns_url() {
        let client = Arc::new(CannedHttpClient::new().with_route("/checkouts", 201, CHECKOUT));
        let processor = LemonSqueezyProcessor::new(client.clone(), config());
        let draft = OrderDraft {
            order_id: String::from("insight_9"),
            amount: 1000,
            product_name: String::from("Stock Deep Research"),
            stock_code: String::from("AAPL"),
            timeframe: Timeframe::Short,
            user_id: UserId::parse("3f2b8c1e-9d4a-4f6b-8a2c-1e5d7f9b0c3a").expect("user"),
        };

        let checkout = processor.prepare(&draft).await.expect("checkout");
        assert_eq!(checkout.payment_id.as_deref(), Some("chk_1"));
        assert_eq!(checkout.checkout_url.as_deref(), Some("https://pay.example/chk_1"));

        let sent = &client.requests()[0];
        assert_eq!(
            sent.headers.get("content-type").map(String::as_str),
            Some(JSON_API)
        );
        let body: Value = serde_json::from_str(sent.body.as_deref().expect("body")).expect("json");
        assert_eq!(
            body["data"]["attributes"]["checkout_data"]["custom"]["merchant_uid"],
            "insight_9"
        );
        assert_eq!(body["data"]["attributes"]["custom_price"], 1000);
    }

    #[tokio::test]
    async fn payment_combines_checkout_echo_with_order_state() {
        let client = Arc::new(
            CannedHttpClient::new()
                .with_route("checkouts/chk_1", 200, CHECKOUT)
                .with_route("/orders", 200, order("paid", false, 0)),
        );
        let processor = LemonSqueezyProcessor::new(client, config());

        let record = processor.fetch_payment("chk_1").await.expect("record");
        assert_eq!(record.status, PaymentStatus::Paid);
        assert_eq!(record.amount, 1000);
        assert_eq!(record.order_id.as_deref(), Some("insight_9"));
        assert!(record.paid_at.is_some());
    }

    #[tokio::test]
    async fn refunded_order_is_not_refunded_again() {
        let client = Arc::new(
            CannedHttpClient::new().with_route("/orders", 200, order("refunded", true, 1000)),
        );
        let processor = LemonSqueezyProcessor::new(client.clone(), config());

        let outcome = processor
            .cancel(&CancelRequest::full("chk_1", "generation failed"))
            .await
            .expect("no-op");
        assert_eq!(outcome.cancelled_amount, 1000);
        assert_eq!(client.count_matching("/refunds"), 0);
    }

    #[tokio::test]
    async fn refund_covers_the_remaining_amount() {
        let client = Arc::new(
            CannedHttpClient::new()
                .with_route("/orders", 200, order("partial_refund", false, 400))
                .with_route("/refunds", 201, r#"{"data":{"id":"r_1"}}"#),
        );
        let processor = LemonSqueezyProcessor::new(client.clone(), config());

        let outcome = processor
            .cancel(&CancelRequest::full("chk_1", "generation failed"))
            .await
            .expect("refund");
        assert_eq!(outcome.cancelled_amount, 1000);

        let refund = client
            .requests()
            .into_iter()
            .find(|request| request.url.contains("/refunds"))
            .expect("refund request");
        let body: Value = serde_json::from_str(refund.body.as_deref().expect("body")).expect("json");
        assert_eq!(body["data"]["attributes"]["amount"], 600);
    }
}
