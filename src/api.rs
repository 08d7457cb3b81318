use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::EngineError;
use crate::orderbook::{BookSnapshot, Quote};
use crate::orders::{Order, OrderId, OrderType, Side};
use crate::state::AppState;
use crate::trade::{Match, Trade};

/// Request payload for `POST /orders`.
///
/// - `market`: instrument code, must match the one the server trades
/// - `order_type`: limit (requires `price`) or market (`price` ignored)
#[derive(Debug, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub user_id: u64,
    pub market: String,
    pub side: Side,
    pub order_type: OrderType,
    pub size: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Response for `POST /orders`: the generated order id, plus the matches a
/// market order produced (empty for a resting limit order).
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub matches: Vec<Match>,
}

/// `GET /book` response: the book snapshot tagged with the instrument code.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookView {
    pub market: String,
    #[serde(flatten)]
    pub snapshot: BookSnapshot,
}

/// JSON error response carrying the status the engine failure maps to:
/// bad input 400, unknown order 404, insufficient liquidity 422.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidOrder { .. } => StatusCode::BAD_REQUEST,
            EngineError::InsufficientLiquidity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::UnknownOrder { .. } => StatusCode::NOT_FOUND,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// `POST /orders`
/// *Success:* 200, JSON [`OrderAck`]
/// *Failure:* 400 on bad input, 422 on an oversized market order
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<NewOrderRequest>,
) -> Result<Json<OrderAck>, ApiError> {
    if request.market != state.market {
        return Err(ApiError::bad_request(format!(
            "unsupported market: {}",
            request.market
        )));
    }

    let order = Order::new(request.side, request.size, request.user_id);
    let order_id = order.id;
    let matches = {
        let mut book = state.book.write().unwrap();
        match request.order_type {
            OrderType::Limit => {
                let price = request
                    .price
                    .ok_or_else(|| ApiError::bad_request("limit order requires a price"))?;
                book.place_limit(price, order)?;
                Vec::new()
            }
            OrderType::Market => book.place_market(order)?,
        }
    };
    Ok(Json(OrderAck { order_id, matches }))
}

/// `DELETE /orders/{id}`
/// *Success:* 200, JSON `{ "status": "cancelled" }`
/// *Failure:* 404 when the order is not resting
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.book.write().unwrap().cancel(id)?;
    Ok(Json(json!({ "status": "cancelled" })))
}

/// `GET /book`
/// Returns a JSON snapshot of the current book, levels in priority order.
pub async fn get_order_book(State(state): State<AppState>) -> Json<BookView> {
    let snapshot = state.book.read().unwrap().snapshot();
    Json(BookView {
        market: state.market.clone(),
        snapshot,
    })
}

/// `GET /book/best-bid`
pub async fn get_best_bid(State(state): State<AppState>) -> Json<Quote> {
    Json(state.book.read().unwrap().best_bid())
}

/// `GET /book/best-ask`
pub async fn get_best_ask(State(state): State<AppState>) -> Json<Quote> {
    Json(state.book.read().unwrap().best_ask())
}

/// `GET /trades`
/// Returns the trade log, oldest first.
pub async fn get_trade_log(State(state): State<AppState>) -> Json<Vec<Trade>> {
    Json(state.book.read().unwrap().trades().to_vec())
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", delete(cancel_order))
        .route("/book", get(get_order_book))
        .route("/book/best-bid", get(get_best_bid))
        .route("/book/best-ask", get(get_best_ask))
        .route("/trades", get(get_trade_log))
        .with_state(state)
}

/// Bind `addr` and serve the engine until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, market = %state.market, "exchange listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
