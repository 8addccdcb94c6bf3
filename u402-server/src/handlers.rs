//! Axum route handlers of the marketplace API.
//!
//! Only `POST /api/premium/execute` is payment gated; the other endpoints
//! help clients build and price their payments.

use std::sync::Arc;

use alloy_primitives::Address;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use u402::amount::TokenAmount;
use u402::config::PaymentConfig;
use u402::facilitator::Facilitator;
use u402::proto::PaymentOutcome;
use u402::quote::Quote;
use u402::timestamp::UnixMillis;
use u402_evm::TypedAuthorization;
use u402_evm::typed_data::{TypedPaymentMessage, authorization_request, payment_message};
use u402_http::X402Middleware;
use u402_http::server::{PaymentInfo, payment_info};

use crate::error::ApiError;
use crate::marketplace::{AgentType, AgentTypeInfo};

/// Shared application state.
pub type AppState = Arc<PaymentConfig>;

/// `GET /health` - Liveness and whether payments are enforced.
pub async fn health(State(config): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "x402Enabled": config.enabled,
    }))
}

/// `GET /` - API descriptor.
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "UltraMarket API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "AI agent task marketplace with x402 payments",
        "endpoints": {
            "agentTypes": "/api/agents/types",
            "x402": "/api/x402/info",
            "quote": "/api/payment/quote",
            "authorizationRequest": "/api/payment/authorization-request",
            "paymentMessage": "/api/payment/message",
            "premium": "/api/premium/execute",
        }
    }))
}

/// `GET /api/agents/types` - Agent type catalogue.
pub async fn agent_types() -> Json<Value> {
    let types: Vec<AgentTypeInfo> = AgentType::ALL.into_iter().map(Into::into).collect();
    Json(json!({ "success": true, "types": types }))
}

/// Query of `GET /api/x402/info`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InfoQuery {
    /// Price in wei, defaults to the configured price.
    pub price: Option<TokenAmount>,
}

/// Answer of `GET /api/x402/info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    /// Always `true`.
    pub success: bool,
    /// Traditional payment parameters.
    pub payment_info: PaymentInfo,
}

/// `GET /api/x402/info?price=<wei>` - Traditional payment parameters.
pub async fn x402_info(
    State(config): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> Json<InfoResponse> {
    let price = query.price.unwrap_or(config.default_price_wei);
    Json(InfoResponse {
        success: true,
        payment_info: payment_info(&config, price),
    })
}

/// Body of `POST /api/payment/quote`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// ETH amount as a decimal string or JSON number.
    pub eth_amount: Option<Value>,
    /// Service the quote is for, echoed back.
    pub service_type: Option<String>,
}

/// `POST /api/payment/quote` - USDC quote of an ETH amount.
///
/// # Errors
///
/// Returns [`ApiError`] when `ethAmount` is missing or not a decimal.
pub async fn quote(
    State(config): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<Quote>, ApiError> {
    let amount = match request.eth_amount {
        Some(Value::String(amount)) => amount,
        Some(Value::Number(amount)) => amount.to_string(),
        Some(_) | None => return Err(ApiError::BadRequest("ethAmount is required".into())),
    };
    let quote = config.quote_calculator().quote_str(&amount)?;
    Ok(Json(match request.service_type {
        Some(service_type) => quote.with_service_type(service_type),
        None => quote,
    }))
}

/// Body of `POST /api/payment/authorization-request`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequestBody {
    /// Payer wallet.
    pub payer: Address,
    /// Amount in USDC smallest units, usually a quote's `totalRaw`.
    pub amount_usdc: TokenAmount,
}

/// `POST /api/payment/authorization-request` - Typed data a wallet signs for gasless mode.
pub async fn authorization(
    State(config): State<AppState>,
    Json(body): Json<AuthorizationRequestBody>,
) -> Json<TypedAuthorization> {
    Json(authorization_request(&config, body.payer, body.amount_usdc))
}

/// Body of `POST /api/payment/message`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMessageBody {
    /// Payer wallet.
    pub payer: Address,
    /// Amount in wei.
    pub amount: TokenAmount,
    /// Unique nonce.
    pub nonce: TokenAmount,
    /// Signing time, defaults to now.
    pub timestamp: Option<UnixMillis>,
}

/// `POST /api/payment/message` - Typed data a wallet signs for traditional mode.
pub async fn message(
    State(config): State<AppState>,
    Json(body): Json<PaymentMessageBody>,
) -> Json<TypedPaymentMessage> {
    Json(payment_message(
        &config,
        body.payer,
        body.amount,
        body.nonce,
        body.timestamp.unwrap_or_else(UnixMillis::now),
    ))
}

/// Task submitted to `POST /api/premium/execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumTask {
    /// What the agent should do.
    #[serde(default)]
    pub description: String,
    /// Agent kind, as id or name.
    #[serde(default)]
    pub agent_type: Option<AgentType>,
}

/// `POST /api/premium/execute` - Paid task execution.
///
/// The outcome is absent when payments are not enforced.
pub async fn premium_execute(
    payment: Option<Extension<PaymentOutcome>>,
    Json(task): Json<PremiumTask>,
) -> Json<Value> {
    tracing::info!(
        payer = ?payment.as_ref().map(|Extension(outcome)| outcome.payer),
        agent_type = ?task.agent_type,
        "premium execution started"
    );
    Json(json!({
        "success": true,
        "message": "Premium execution started",
        "payment": payment.map(|Extension(outcome)| outcome),
        "task": task,
    }))
}

/// Creates the API [`Router`], gating the premium route with `x402`.
pub fn router<F>(x402: &X402Middleware<F>) -> Router
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    let premium = x402
        .with_default_price()
        .with_description("UltraMarket - Premium AI agent task execution")
        .with_resource("ultramarket://api/premium/execute");
    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health))
        .route("/api/agents/types", get(agent_types))
        .route("/api/x402/info", get(x402_info))
        .route("/api/payment/quote", post(quote))
        .route("/api/payment/authorization-request", post(authorization))
        .route("/api/payment/message", post(message))
        .route("/api/premium/execute", post(premium_execute).layer(premium))
        .with_state(Arc::clone(x402.config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use u402_http::constants::{MODE_HEADER, PAYER_HEADER, PAYMENT_HEADER};

    fn app(enabled: bool) -> Router {
        let config = PaymentConfig {
            enabled,
            recipient: "0x2222222222222222222222222222222222222222".parse().unwrap(),
            ..PaymentConfig::default()
        };
        router(&X402Middleware::try_from_config(config).unwrap())
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_enforcement() {
        let (status, body) = call(
            app(true),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["x402Enabled"], true);
    }

    #[tokio::test]
    async fn test_info_uses_query_price() {
        let (_, body) = call(
            app(true),
            Request::get("/api/x402/info?price=42").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body["paymentInfo"]["amount"], "42");
        assert_eq!(body["paymentInfo"]["currency"], "ETH");
        assert_eq!(body["paymentInfo"]["version"], "1.0");
    }

    #[tokio::test]
    async fn test_quote_endpoint() {
        let (status, body) = call(
            app(false),
            post_json(
                "/api/payment/quote",
                &json!({"ethAmount": "0.001", "serviceType": "analysis"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalRaw"], "2562500");
        assert_eq!(body["usdcAmount"], "2.50");
        assert_eq!(body["serviceType"], "analysis");

        let (status, body) = call(app(false), post_json("/api/payment/quote", &json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ethAmount is required");
    }

    #[tokio::test]
    async fn test_authorization_request_endpoint() {
        let (status, body) = call(
            app(true),
            post_json(
                "/api/payment/authorization-request",
                &json!({
                    "payer": "0x1111111111111111111111111111111111111111",
                    "amountUsdc": "2562500"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["primaryType"], "TransferWithAuthorization");
        assert_eq!(body["message"]["value"], "2562500");
        assert_eq!(body["message"]["validAfter"], "0");
    }

    #[tokio::test]
    async fn test_premium_without_enforcement_echoes_task() {
        let (status, body) = call(
            app(false),
            post_json(
                "/api/premium/execute",
                &json!({"description": "summarize", "agentType": 1}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["agentType"], "Analyst");
        assert!(body["payment"].is_null());
    }

    #[tokio::test]
    async fn test_premium_requires_payment() {
        let (status, body) = call(
            app(true),
            post_json("/api/premium/execute", &json!({"description": "summarize"})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body["x402"]["gasless"]["requirements"]["resource"],
            "ultramarket://api/premium/execute"
        );
    }

    #[tokio::test]
    async fn test_premium_with_traditional_payment() {
        let app = app(true);
        let config = PaymentConfig {
            recipient: "0x2222222222222222222222222222222222222222".parse().unwrap(),
            ..PaymentConfig::default()
        };
        let signer = PrivateKeySigner::random();
        let header = u402_evm::signer::sign_traditional(
            &signer,
            &config,
            config.default_price_wei,
            TokenAmount::from(11_u64),
        )
        .unwrap();
        let req = Request::post("/api/premium/execute")
            .header("content-type", "application/json")
            .header(PAYMENT_HEADER, serde_json::to_string(&header).unwrap())
            .header(PAYER_HEADER, signer.address().to_string())
            .header(MODE_HEADER, "traditional")
            .body(Body::from(
                json!({"description": "write a report", "agentType": "writer"}).to_string(),
            ))
            .unwrap();
        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment"]["mode"], "traditional");
        assert_eq!(body["payment"]["nonce"], "11");
        assert_eq!(body["task"]["agentType"], "Writer");
    }
}
