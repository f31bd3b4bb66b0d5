//! HTTP balance service for RelayChain
//!
//! Keeps a [`BalanceLedger`] in step with the chain by listening on the
//! `client-notify` topic, and accepts signed transfers which it forwards to
//! the miners.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::balances::{BalanceLedger, TransferError};
use crate::bus::{BusMessage, MessageBus, Topic};
use crate::error::ChainError;
use crate::transaction::Transaction;

/// How often an unsynced service repeats its chain request.
const SNAPSHOT_RETRY: Duration = Duration::from_secs(2);

/// Shared state behind every route.
#[derive(Clone)]
pub struct BalanceService {
    ledger: Arc<RwLock<BalanceLedger>>,
    bus: Arc<dyn MessageBus>,
    print_accounts: bool,
}

impl BalanceService {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        BalanceService {
            ledger: Arc::new(RwLock::new(BalanceLedger::new())),
            bus,
            print_accounts: false,
        }
    }

    /// Prints the account table to stdout whenever balances change.
    pub fn with_account_printing(mut self, enabled: bool) -> Self {
        self.print_accounts = enabled;
        self
    }

    pub fn ledger(&self) -> Arc<RwLock<BalanceLedger>> {
        self.ledger.clone()
    }

    fn request_snapshot(&self) {
        match self
            .bus
            .publish_message(Topic::ClientNotify, &BusMessage::RequestChain)
        {
            Ok(()) => debug!("requested chain snapshot"),
            Err(e) => warn!(error = %e, "failed to request chain snapshot"),
        }
    }

    /// Subscribes to `client-notify`, asks for the chain and keeps the ledger
    /// current until the bus goes away.
    pub async fn follow_bus(self) -> Result<(), ChainError> {
        let mut rx = self.bus.subscribe(Topic::ClientNotify)?;
        self.request_snapshot();

        let mut retry = tokio::time::interval(SNAPSHOT_RETRY);
        retry.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(payload) => match BusMessage::from_json(&payload) {
                        Ok(message) => self.handle_bus_message(message).await,
                        Err(e) => debug!(error = %e, "discarding malformed client-notify message"),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "balance service lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ChainError::BusError("client-notify closed".to_string()));
                    }
                },
                _ = retry.tick() => {
                    if !self.ledger.read().await.is_synced() {
                        self.request_snapshot();
                    }
                }
            }
        }
    }

    /// Applies one `client-notify` message to the ledger.
    pub async fn handle_bus_message(&self, message: BusMessage) {
        match message {
            BusMessage::ChainSnapshot(blocks) => {
                let mut ledger = self.ledger.write().await;
                if ledger.is_synced() {
                    debug!(height = blocks.len(), "ignoring snapshot, already synced");
                    return;
                }
                ledger.load_snapshot(&blocks);
                info!(height = blocks.len(), accounts = ledger.accounts().len(), "balances loaded from chain snapshot");
                self.print(&ledger);
            }
            BusMessage::NewBlock(block) => {
                if let Err(e) = block.verify_hash() {
                    warn!(error = %e, "ignoring announced block");
                    return;
                }
                let mut ledger = self.ledger.write().await;
                let applied = ledger.apply_block(&block);
                info!(
                    hash = block.block_hash().unwrap_or_default(),
                    applied,
                    "applied new block"
                );
                let synced = ledger.is_synced();
                self.print(&ledger);
                drop(ledger);
                if !synced {
                    self.request_snapshot();
                }
            }
            BusMessage::NewTransaction(_) => {
                if !self.ledger.read().await.is_synced() {
                    self.request_snapshot();
                }
            }
            BusMessage::RequestChain => {}
        }
    }

    fn print(&self, ledger: &BalanceLedger) {
        if self.print_accounts {
            println!("{}", crate::cli::accounts_table(&ledger.accounts()));
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Transfer(TransferError),
    InvalidInput(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Transfer(e @ TransferError::Duplicate) => (StatusCode::CONFLICT, e.to_string()),
            ApiError::Transfer(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        ApiError::Transfer(err)
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignObject {
    pub signature: String,
}

/// Body of `POST /send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub message_hash: String,
    pub sign_obj: SignObject,
}

impl SendRequest {
    pub fn from_transaction(tx: &Transaction) -> Self {
        SendRequest {
            sender: tx.sender.clone(),
            recipient: tx.recipient.clone(),
            amount: tx.amount,
            message_hash: tx.message_hash.clone(),
            sign_obj: SignObject {
                signature: tx.signature.clone(),
            },
        }
    }

    pub fn into_transaction(self) -> Transaction {
        Transaction {
            sender: self.sender,
            recipient: self.recipient,
            amount: self.amount,
            message_hash: self.message_hash,
            signature: self.sign_obj.signature,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountEntry {
    pub address: String,
    pub balance: u64,
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(service: BalanceService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/balance/:address", get(get_balance))
        .route("/send", post(send))
        .route("/accounts", get(get_accounts))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(service)
        .layer(cors)
}

/// Serves the API on `0.0.0.0:port` until the listener fails.
pub async fn run_api_server(service: BalanceService, port: u16) -> Result<(), ChainError> {
    let app = build_api_router(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "balance service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_balance(
    State(service): State<BalanceService>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let balance = service.ledger.read().await.balance(&address);
    Json(BalanceResponse { balance })
}

async fn send(
    State(service): State<BalanceService>,
    Json(request): Json<SendRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if request.sender == request.recipient {
        return Err(ApiError::InvalidInput(
            "Sender and recipient must differ".to_string(),
        ));
    }
    let tx = request.into_transaction();

    let balance = service.ledger.write().await.transfer(&tx)?;
    info!(
        sender = %tx.sender,
        recipient = %tx.recipient,
        amount = tx.amount,
        "transfer accepted"
    );

    if let Err(e) = service
        .bus
        .publish_message(Topic::ClientNotify, &BusMessage::NewTransaction(tx))
    {
        warn!(error = %e, "failed to forward transaction to miners");
    }

    Ok(Json(BalanceResponse { balance }))
}

async fn get_accounts(State(service): State<BalanceService>) -> Json<Vec<AccountEntry>> {
    let accounts = service
        .ledger
        .read()
        .await
        .accounts()
        .into_iter()
        .map(|(address, balance)| AccountEntry { address, balance })
        .collect();
    Json(accounts)
}

async fn health_check(State(service): State<BalanceService>) -> impl IntoResponse {
    let ledger = service.ledger.read().await;
    let (status, label) = if ledger.is_synced() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "syncing")
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "blocks_seen": ledger.blocks_seen(),
            "accounts": ledger.accounts().len(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}
