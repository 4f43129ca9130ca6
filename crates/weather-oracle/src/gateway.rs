//! HTTP JSON API for consumers of the local chain.
//!
//! Consumers submit requests and read results here; the relayer never goes
//! through this surface.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use oracle_ledger::{Address, LedgerError, Request, RequestId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::chain::{ChainError, LedgerInfo, LocalChain};
use crate::error::{OracleError, Result};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<LocalChain>,
}

/// JSON request for a new weather request
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub caller: Address,
    #[serde(default)]
    pub value: u128,
    pub lat: i64,
    pub lon: i64,
}

/// JSON response for an accepted request
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub index: usize,
    pub request_id: RequestId,
}

/// One ledger record with its position
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestResponse {
    pub index: usize,
    #[serde(flatten)]
    pub request: Request,
}

/// JSON response for the request list
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestListResponse {
    pub requests: Vec<RequestResponse>,
}

/// JSON request for crediting an account
#[derive(Debug, Serialize, Deserialize)]
pub struct FundRequest {
    pub amount: u128,
}

/// JSON response for account balance
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub balance: u128,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A chain error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        let status = match &err {
            ChainError::Rejected(rejection) => match rejection {
                LedgerError::InvalidLocation { .. }
                | LedgerError::BalanceOverflow(_)
                | LedgerError::CompletionRejected(_) => StatusCode::BAD_REQUEST,
                LedgerError::InsufficientFee { .. } | LedgerError::FeeTransferFailed(_) => {
                    StatusCode::PAYMENT_REQUIRED
                }
                LedgerError::Unauthorized(_) => StatusCode::FORBIDDEN,
                LedgerError::UnknownOrAlreadyCompletedRequest(_) => StatusCode::CONFLICT,
                LedgerError::IndexOutOfRange(_) => StatusCode::NOT_FOUND,
            },
            ChainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("[Gateway] {}", self.message);
        } else {
            log::debug!("[Gateway] {} {}", self.status.as_u16(), self.message);
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /v1/ledger - Deployment parameters and counters
async fn ledger_info(State(state): State<AppState>) -> ApiResult<LedgerInfo> {
    Ok(Json(state.chain.info()?))
}

/// POST /v1/requests - Pay the fee and request weather for a coordinate
async fn submit_request(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> std::result::Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let receipt = state
        .chain
        .submit(body.caller, body.value, body.lat, body.lon)?;
    log::info!(
        "[Gateway] request #{} {} from {} at ({}, {})",
        receipt.index,
        receipt.request_id,
        body.caller,
        body.lat,
        body.lon
    );
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            index: receipt.index,
            request_id: receipt.request_id,
        }),
    ))
}

/// GET /v1/requests - Every record in insertion order
async fn list_requests(State(state): State<AppState>) -> ApiResult<RequestListResponse> {
    let requests = state
        .chain
        .requests()?
        .into_iter()
        .enumerate()
        .map(|(index, request)| RequestResponse { index, request })
        .collect();
    Ok(Json(RequestListResponse { requests }))
}

/// GET /v1/requests/{index} - One record
async fn get_request(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<RequestResponse> {
    let request = state.chain.view(index)?;
    Ok(Json(RequestResponse { index, request }))
}

/// POST /v1/accounts/{address}/fund - Credit an account
async fn fund_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(body): Json<FundRequest>,
) -> ApiResult<BalanceResponse> {
    let address = parse_address(&address)?;
    let balance = state.chain.fund(address, body.amount)?;
    Ok(Json(BalanceResponse { address, balance }))
}

/// GET /v1/accounts/{address} - Account balance
async fn get_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let address = parse_address(&address)?;
    let balance = state.chain.balance_of(&address)?;
    Ok(Json(BalanceResponse { address, balance }))
}

fn parse_address(raw: &str) -> std::result::Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("bad address: {}", e)))
}

/// Create the HTTP router
pub fn create_router(chain: Arc<LocalChain>) -> Router {
    let state = AppState { chain };

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/ledger", get(ledger_info))
        .route("/v1/requests", get(list_requests).post(submit_request))
        .route("/v1/requests/{index}", get(get_request))
        .route("/v1/accounts/{address}", get(get_account))
        .route("/v1/accounts/{address}/fund", post(fund_account))
        .with_state(state)
}

/// Bind the gateway socket.
pub async fn bind_gateway(listen: &str) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| OracleError::Init(format!("bind {}: {}", listen, e)))
}

/// Serve the gateway on a bound socket until the shutdown signal fires.
pub async fn serve_gateway(
    listener: tokio::net::TcpListener,
    chain: Arc<LocalChain>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let app = create_router(chain);
    if let Ok(addr) = listener.local_addr() {
        log::info!("[Gateway] listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    log::info!("[Gateway] stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use oracle_ledger::{LedgerConfig, RequestStatus};
    use tower::ServiceExt;

    const RELAYER_KEY: &str = "gateway-relayer";

    fn consumer() -> Address {
        Address::new([0x42; 20])
    }

    fn chain(fee: u128) -> Arc<LocalChain> {
        Arc::new(LocalChain::new(LedgerConfig {
            address: Address::new([0xc0; 20]),
            relayer: Address::from_key(RELAYER_KEY),
            fee,
        }))
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = HttpRequest::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        router.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = send(create_router(chain(0)), "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_then_view() {
        let chain = chain(0);
        let router = create_router(chain.clone());

        let response = send(
            router.clone(),
            "POST",
            "/v1/requests",
            Some(serde_json::json!({"caller": consumer(), "lat": 40, "lon": -74})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["index"], 0);

        let response = send(router, "GET", "/v1/requests/0", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["lat"], 40);
        assert_eq!(body["lon"], -74);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["result"], "");
        assert_eq!(chain.view(0).unwrap().status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn invalid_location_is_bad_request() {
        let response = send(
            create_router(chain(0)),
            "POST",
            "/v1/requests",
            Some(serde_json::json!({"caller": consumer(), "lat": 91, "lon": 0})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("91"));
    }

    #[tokio::test]
    async fn underpaid_request_is_payment_required() {
        let chain = chain(10);
        chain.fund(consumer(), 100).unwrap();
        let response = send(
            create_router(chain.clone()),
            "POST",
            "/v1/requests",
            Some(serde_json::json!({"caller": consumer(), "value": 5, "lat": 0, "lon": 0})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(chain.info().unwrap().requests, 0);
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let response = send(create_router(chain(0)), "GET", "/v1/requests/3", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fund_and_read_balance() {
        let router = create_router(chain(0));
        let uri = format!("/v1/accounts/{}/fund", consumer());
        let response = send(
            router.clone(),
            "POST",
            &uri,
            Some(serde_json::json!({"amount": 25})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(router, "GET", &format!("/v1/accounts/{}", consumer()), None).await;
        let body = json_body(response).await;
        assert_eq!(body["balance"], 25);
    }

    #[tokio::test]
    async fn bad_address_is_bad_request() {
        let response = send(create_router(chain(0)), "GET", "/v1/accounts/0x12", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ledger_info_reports_relayer() {
        let response = send(create_router(chain(3)), "GET", "/v1/ledger", None).await;
        let body = json_body(response).await;
        assert_eq!(body["fee"], 3);
        assert_eq!(
            body["relayer"],
            Address::from_key(RELAYER_KEY).to_string()
        );
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let id = RequestId::derive(0, &Address::ZERO, 0);
        let cases = [
            (
                LedgerError::InsufficientFee {
                    required: 2,
                    supplied: 1,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                LedgerError::Unauthorized(Address::ZERO),
                StatusCode::FORBIDDEN,
            ),
            (
                LedgerError::UnknownOrAlreadyCompletedRequest(id),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(ChainError::from(err)).status, expected);
        }
    }
}
