use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use link_content::fetcher::ReqwestFetcher;
use link_content::firecrawl::FirecrawlClient;
use link_content::markdown::OpenAiMarkdownConverter;
use link_content::models::ExtractRequest;
use link_content::social::BirdCliReader;
use link_content::transcript::NoTranscriptResolver;
use link_content::{fetch_link_content, LinkDeps, LinkError, Settings};

const DEFAULT_DEADLINE_MS: u64 = 120_000;

struct AppState {
    deps: LinkDeps,
    deadline: Duration,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env();
    let state = match build_state(&settings) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/extract", post(extract_endpoint))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

fn build_state(settings: &Settings) -> Result<AppState, link_content::CapabilityError> {
    let fetcher = ReqwestFetcher::new(settings.insecure_ssl)?;
    let mut deps = LinkDeps::new(Arc::new(fetcher), Arc::new(NoTranscriptResolver))
        .with_keys(settings.transcription_keys());

    if let Some(key) = &settings.firecrawl_api_key {
        deps = deps.with_firecrawl(Arc::new(FirecrawlClient::new(
            key.clone(),
            settings.firecrawl_base_url.clone(),
        )));
    }
    if let Some(key) = &settings.openai_api_key {
        deps = deps.with_markdown(Arc::new(OpenAiMarkdownConverter::new(
            key.clone(),
            settings.openai_base_url.clone(),
            settings.openai_model.clone(),
        )));
    }
    if let Some(bin) = &settings.bird_bin {
        deps = deps.with_tweet_reader(Arc::new(BirdCliReader::new(bin.clone())));
    }

    tracing::info!(
        firecrawl = deps.firecrawl.is_some(),
        markdown = deps.markdown.is_some(),
        bird = deps.tweet_reader.is_some(),
        "capabilities configured"
    );

    Ok(AppState {
        deps,
        deadline: Duration::from_millis(settings.deadline_ms.unwrap_or(DEFAULT_DEADLINE_MS)),
    })
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn extract_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Response {
    let call = fetch_link_content(&req.url, &req.options, &state.deps);
    let result = match tokio::time::timeout(state.deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(url = %req.url, "extraction deadline elapsed");
            let detail = format!(
                "Extraction of {} did not finish within {}ms",
                req.url,
                state.deadline.as_millis()
            );
            return (StatusCode::GATEWAY_TIMEOUT, Json(json!({"detail": detail}))).into_response();
        }
    };

    match result {
        Ok(content) => (StatusCode::OK, Json(content)).into_response(),
        Err(e) => {
            let status = match &e {
                LinkError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                LinkError::TranscriptionUnavailable { .. }
                | LinkError::TranscriptUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LinkError::Exhausted(_) | LinkError::SocialBlocked(_) => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({"detail": e.to_string()}))).into_response()
        }
    }
}
