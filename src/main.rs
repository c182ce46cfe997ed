use std::net::SocketAddr;
use std::sync::Arc;
use landmark_emotion::utils::config::Config;
use landmark_emotion::utils::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();

    // Inference artifacts are required; a missing one stops startup before we bind.
    let resources = load_resources(&cfg).await?;
    info!(
        classes = ?resources.classes(),
        sequence_length = resources.sequence_length(),
        "pipeline ready"
    );

    let state = Arc::new(landmark_emotion::AppState::new(&cfg, resources));
    let app = landmark_emotion::api::routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "onnx")]
async fn load_resources(cfg: &Config) -> anyhow::Result<landmark_emotion::pipeline::PipelineResources> {
    let cfg = cfg.clone();
    let loaded = tokio::task::spawn_blocking(move || landmark_emotion::pipeline::PipelineResources::load(&cfg)).await?;
    loaded.map_err(|e| {
        error!("Error loading model/scaler/encoder/face mesh: {}", e);
        anyhow::Error::new(e)
    })
}

#[cfg(not(feature = "onnx"))]
async fn load_resources(_cfg: &Config) -> anyhow::Result<landmark_emotion::pipeline::PipelineResources> {
    error!("Built without the `onnx` feature; no classifier backend available");
    anyhow::bail!("landmark-emotion was built without the `onnx` feature")
}
