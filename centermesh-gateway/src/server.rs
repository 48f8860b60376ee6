use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use centermesh::{DomainError, RpcClient, RpcError};

use crate::router::RouteTable;

/// Gateway state shared by every request
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Client for calling workers over the broker
    pub client: RpcClient,
    /// Ordered prefix table
    pub routes: Arc<RouteTable>,
}

impl GatewayState {
    pub fn new(client: RpcClient, routes: RouteTable) -> Self {
        Self {
            client,
            routes: Arc::new(routes),
        }
    }
}

/// Build the HTTP edge: `/health` plus a catch-all that forwards every other
/// request to the worker owning its path.
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(handle_request)
        .with_state(state)
}

/// Route, call, and return the worker's payload unmodified
async fn handle_request(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let body = if method == Method::POST || method == Method::PUT {
        parse_body(&body)?
    } else {
        None
    };

    let call = state.routes.route(&method, uri.path(), body)?;
    debug!("{} {} -> {}::{}", method, uri.path(), call.service, call.pattern);

    let result = state
        .client
        .call_default(&call.service, &call.pattern, call.payload)
        .await;

    match result {
        Ok(payload) => Ok(Json(payload)),
        Err(err) if err.is_transport() => {
            error!("{} {} failed in transport: {}", method, uri.path(), err);
            Err(err.into())
        }
        Err(err) => {
            debug!("{} {} rejected by {}: {}", method, uri.path(), call.service, err);
            Err(err.into())
        }
    }
}

fn parse_body(body: &Bytes) -> Result<Option<Value>, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| GatewayError::InvalidBody(e.to_string()))
}

/// Health check for the gateway itself
async fn health_check(State(state): State<GatewayState>) -> (StatusCode, Json<Value>) {
    let healthy = state.client.is_healthy().await;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "gateway": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "rpc": state.client.stats(),
        })),
    )
}

/// Gateway-specific errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Rpc(RpcError::Unroutable { .. }) => StatusCode::NOT_FOUND,
            Self::Rpc(RpcError::TransportUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rpc(RpcError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Rpc(RpcError::UnknownPattern { .. }) => StatusCode::BAD_GATEWAY,
            Self::Rpc(RpcError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rpc(RpcError::Domain(err)) => domain_status(err),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::InvalidBody(_) => "InvalidBody",
            Self::Rpc(err) => err.kind(),
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err.kind.as_str() {
        DomainError::NOT_FOUND => StatusCode::NOT_FOUND,
        DomainError::CONFLICT => StatusCode::CONFLICT,
        DomainError::INVALID => StatusCode::BAD_REQUEST,
        DomainError::UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Gateway error ({}): {}", status, self);
        }

        let message = match &self {
            Self::Rpc(RpcError::Domain(err)) => err.message.clone(),
            other => other.to_string(),
        };
        let body = json!({
            "kind": self.kind(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
