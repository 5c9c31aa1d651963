mod config;
mod models;
mod services;
mod utils;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    response::{Html, Json},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use models::{AnalysisResult, AnalyzeRequest};
use services::analyzer::Analyzer;
use services::fetcher::HttpFetcher;
use services::llm::LLMClient;
use services::reviews::ReviewExtractor;

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env()?;

    let fetcher = HttpFetcher::new(&config.review_site_url, config.fetch_timeout)
        .context("Failed to create review site client")?;
    let extractor = ReviewExtractor::new(Arc::new(fetcher), config.review_site_url.clone());

    let llm_client = LLMClient::new(
        &config.llm_api_url,
        &config.llm_api_key,
        &config.llm_model,
        config.llm_timeout,
    )
    .context("Failed to create completion client")?;

    let analyzer = Analyzer::new(
        extractor,
        Arc::new(llm_client),
        config.retry,
        config.max_reviews,
    );
    let app = app(AppState {
        analyzer: Arc::new(analyzer),
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/scan", get(scan_page))
        .route("/analyze", post(analyze))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn landing() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Bookscan</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
    </style>
</head>
<body>
    <h1>Bookscan</h1>
    <div class="info-box">
        <p>Type a book title and get a summary of what real readers think of it:
        a rating, what people liked and disliked, and who it is for.</p>
    </div>
    <p><a href="/scan">Scan a book</a></p>
</body>
</html>"#,
    )
}

async fn scan_page() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Bookscan - Scan</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        pre { background-color: #f5f5f5; padding: 10px; border-radius: 4px; white-space: pre-wrap; }
    </style>
</head>
<body>
    <h1>Scan a book</h1>
    <form id="scan">
        <input id="title" name="book_title" placeholder="Book title" size="40">
        <button type="submit">Analyze</button>
    </form>
    <pre id="result"></pre>
    <script>
        document.getElementById("scan").addEventListener("submit", async (event) => {
            event.preventDefault();
            const out = document.getElementById("result");
            out.textContent = "Reading reviews...";
            const response = await fetch("/analyze", {
                method: "POST",
                headers: { "Content-Type": "application/json" },
                body: JSON.stringify({ book_title: document.getElementById("title").value }),
            });
            out.textContent = JSON.stringify(await response.json(), null, 2);
        });
    </script>
</body>
</html>"#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<AnalysisResult> {
    Json(state.analyzer.analyze(&request.book_title).await)
}
