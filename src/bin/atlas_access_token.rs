//! Print a bearer token for the service account in `MONGODB_ATLAS_CLIENT_ID`
//! and `MONGODB_ATLAS_CLIENT_SECRET`.
//!
//! The token endpoint is taken from `MONGODB_ATLAS_BASE_URL` when set.

use hemmer_provider_atlas::client::request_access_token;
use hemmer_provider_atlas::config::{resolve_base_url, Vars};
use hemmer_provider_atlas::ProviderError;

async fn run() -> Result<String, ProviderError> {
    let env = Vars::from_env();
    if env.client_id.is_empty() || env.client_secret.is_empty() {
        return Err(ProviderError::Configuration(
            "MONGODB_ATLAS_CLIENT_ID and MONGODB_ATLAS_CLIENT_SECRET must be set".to_string(),
        ));
    }

    let base_url = resolve_base_url(&Vars::default(), &env, false);
    let http = reqwest::Client::new();
    let token = request_access_token(&http, &base_url, &env.client_id, &env.client_secret).await?;
    Ok(token.access_token)
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(token) => println!("{}", token),
        Err(err) => {
            eprintln!("Failed to generate access token: {}", err);
            std::process::exit(1);
        }
    }
}
