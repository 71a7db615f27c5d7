//! HTTP server setup and configuration.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::cors::cors_layer;
use super::handlers;
use crate::config::{Config, ConfigError};
use crate::provider::{CompletionClient, HumeClient, OpenAiCompatClient, SpeechClient};

/// Response header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id assigned to every request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Shared application state.
///
/// Upstream clients are injected, so tests can substitute fakes.
#[derive(Clone)]
pub struct AppState {
    pub completion: Arc<dyn CompletionClient>,
    pub speech: Arc<dyn SpeechClient>,
    /// Used only after `speech` fails with a rate/quota error.
    pub speech_backup: Option<Arc<dyn SpeechClient>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build the real reqwest-backed clients from configuration.
    ///
    /// All clients share one connection pool with explicit timeouts.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.server.request_timeout())
            .connect_timeout(config.server.connect_timeout())
            .build()?;

        let completion = OpenAiCompatClient::new(http_client.clone(), &config.chat);
        let speech = HumeClient::new(
            http_client.clone(),
            &config.speech.url,
            config.speech.api_key.clone(),
            config.speech.format,
        );
        let speech_backup = config.speech.backup_api_key.clone().map(|key| {
            Arc::new(HumeClient::new(
                http_client.clone(),
                &config.speech.url,
                Some(key),
                config.speech.format,
            )) as Arc<dyn SpeechClient>
        });

        Ok(Self {
            completion: Arc::new(completion),
            speech: Arc::new(speech),
            speech_backup,
            config: Arc::new(config),
        })
    }
}

/// Assign a [`RequestId`] and echo it in the response headers.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Result<Router, ConfigError> {
    let cors = cors_layer(&state.config.cors)?;

    Ok(Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/tts", post(handlers::text_to_speech))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let state = AppState::from_config(config)?;
    let app = create_router(state)?;

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting voxrelay server");

    axum::serve(listener, app).await?;

    Ok(())
}
