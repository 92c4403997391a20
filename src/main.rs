use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;

use medicine_scanner::api::EventResponse;
use medicine_scanner::services::{ImageSource, OpenRouterService, UploadedFile, VisionService};
use medicine_scanner::{AnalysisSession, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    log::info!("🚀 Starting Medicine Scanner...");

    let config = AppConfig::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let vision = OpenRouterService::new(
        config.openrouter_api_key.clone(),
        config.openrouter_model.clone(),
    )
    .with_base_url(config.openrouter_base_url.clone())
    .with_timeout(config.analysis_timeout);
    log::info!(
        "✅ OpenRouter service initialized with model: {} (timeout {:?})",
        vision.model(),
        config.analysis_timeout
    );

    let vision: Arc<dyn VisionService> = Arc::new(vision);
    let session = Arc::new(AnalysisSession::new(
        vision,
        ImageSource::new(config.max_upload_bytes),
    ));
    log::info!("✅ Analysis session initialized");

    // One-shot mode: `medicine-scanner <image>` prints the analysis and exits
    if let Some(path) = std::env::args().nth(1) {
        let outcome = session
            .upload_and_analyze(vec![UploadedFile::from_path(path)])
            .await;
        let response = EventResponse::from_trigger(outcome, session.snapshot());
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    #[cfg(feature = "http-server")]
    {
        use medicine_scanner::api::server::create_api_router;

        if config.access_token.is_none() {
            log::warn!("⚠️ SCANNER_ACCESS_TOKEN not set, API is open to anyone on the network");
        }

        let app = create_api_router(
            session.clone(),
            config.access_token.clone(),
            config.max_upload_bytes,
        );

        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        log::info!("🌐 API server listening on {}", config.bind_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ API server stopped: {}", e);
            }
        });
    }

    #[cfg(not(feature = "http-server"))]
    anyhow::bail!("built without the http-server feature, pass an image path to analyze");

    log::info!("🎉 Scanner is ready!");

    // Keep running
    tokio::signal::ctrl_c().await?;

    log::info!("🛑 Shutting down...");

    Ok(())
}
