use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::{NewOrderRequest, OrderAck};
use crate::errors::{ClientError, EngineError};
use crate::orderbook::{Quote, SharedBook};
use crate::orders::{Order, OrderId, OrderType, Side};
use crate::trade::{Match, Trade};

/// Parameters for placing an order through an [`ExchangeClient`].
/// `price` is required for limit orders and ignored for market orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderParams {
    pub user_id: u64,
    pub side: Side,
    pub size: Decimal,
    pub price: Option<Decimal>,
}

/// The capability set the market maker and flow generator run against.
///
/// [`InProcessClient`] calls the shared book directly; [`HttpClient`] talks
/// to a remote engine over its JSON surface. Both surface the same typed
/// failures.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_limit(&self, params: PlaceOrderParams) -> Result<OrderId, ClientError>;
    async fn place_market(&self, params: PlaceOrderParams) -> Result<Vec<Match>, ClientError>;
    async fn cancel(&self, id: OrderId) -> Result<(), ClientError>;
    async fn best_bid(&self) -> Result<Quote, ClientError>;
    async fn best_ask(&self) -> Result<Quote, ClientError>;
    async fn trades(&self) -> Result<Vec<Trade>, ClientError>;
}

/// Direct handle on a [`SharedBook`], used by tests and the all-in-one run
/// mode. Every call acquires the lock for its full duration and returns
/// by-value snapshots.
#[derive(Clone)]
pub struct InProcessClient {
    book: SharedBook,
}

impl InProcessClient {
    pub fn new(book: SharedBook) -> Self {
        Self { book }
    }
}

#[async_trait]
impl ExchangeClient for InProcessClient {
    async fn place_limit(&self, params: PlaceOrderParams) -> Result<OrderId, ClientError> {
        let price = params.price.ok_or_else(|| {
            ClientError::Engine(EngineError::InvalidOrder {
                reason: "limit order requires a price".to_string(),
            })
        })?;
        let order = Order::new(params.side, params.size, params.user_id);
        let id = order.id;
        self.book.write().unwrap().place_limit(price, order)?;
        Ok(id)
    }

    async fn place_market(&self, params: PlaceOrderParams) -> Result<Vec<Match>, ClientError> {
        let order = Order::new(params.side, params.size, params.user_id);
        let matches = self.book.write().unwrap().place_market(order)?;
        Ok(matches)
    }

    async fn cancel(&self, id: OrderId) -> Result<(), ClientError> {
        self.book.write().unwrap().cancel(id)?;
        Ok(())
    }

    async fn best_bid(&self) -> Result<Quote, ClientError> {
        Ok(self.book.read().unwrap().best_bid())
    }

    async fn best_ask(&self) -> Result<Quote, ClientError> {
        Ok(self.book.read().unwrap().best_ask())
    }

    async fn trades(&self) -> Result<Vec<Trade>, ClientError> {
        Ok(self.book.read().unwrap().trades().to_vec())
    }
}

/// HTTP implementation of [`ExchangeClient`] against the engine's JSON
/// surface. Non-2xx responses are decoded back into [`ClientError::Api`]
/// with the server's error message.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base: String,
    market: String,
}

impl HttpClient {
    pub fn new(base: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
            market: market.into(),
        }
    }

    async fn post_order(
        &self,
        order_type: OrderType,
        params: PlaceOrderParams,
    ) -> Result<OrderAck, ClientError> {
        let request = NewOrderRequest {
            user_id: params.user_id,
            market: self.market.clone(),
            side: params.side,
            order_type,
            size: params.size,
            price: params.price,
        };
        let response = self
            .http
            .post(format!("{}/orders", self.base))
            .json(&request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| "unknown api error".to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ExchangeClient for HttpClient {
    async fn place_limit(&self, params: PlaceOrderParams) -> Result<OrderId, ClientError> {
        let ack = self.post_order(OrderType::Limit, params).await?;
        Ok(ack.order_id)
    }

    async fn place_market(&self, params: PlaceOrderParams) -> Result<Vec<Match>, ClientError> {
        let ack = self.post_order(OrderType::Market, params).await?;
        Ok(ack.matches)
    }

    async fn cancel(&self, id: OrderId) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(format!("{}/orders/{id}", self.base))
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn best_bid(&self) -> Result<Quote, ClientError> {
        let response = self
            .http
            .get(format!("{}/book/best-bid", self.base))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn best_ask(&self) -> Result<Quote, ClientError> {
        let response = self
            .http
            .get(format!("{}/book/best-ask", self.base))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn trades(&self) -> Result<Vec<Trade>, ClientError> {
        let response = self
            .http
            .get(format!("{}/trades", self.base))
            .send()
            .await?;
        Self::decode(response).await
    }
}
