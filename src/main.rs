use hemmer_provider_atlas::{init_logging, serve, AtlasProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MongoDB Atlas provider");
    serve(AtlasProvider::new()).await
}
