use std::env;
use std::sync::Arc;

use anyhow::Context;
use url::Url;

use operadoras_client::client::cli;
use operadoras_client::client::config::ClientConfig;
use operadoras_client::client::services::api_client::HttpApiClient;
use operadoras_client::client::services::operadoras_store::OperadorasStore;
use operadoras_client::utils::logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env (optional) + environment
    let mut config = ClientConfig::load()?;
    logger::init(&config.log_level)?;

    // optional first argument overrides the API URL
    if let Some(arg) = env::args().nth(1) {
        config.api_url = Url::parse(&arg).with_context(|| format!("invalid API URL argument '{}'", arg))?;
    }
    config.log_summary();

    let api = Arc::new(HttpApiClient::from_config(&config)?);
    let store = Arc::new(OperadorasStore::with_config(api, &config)?);
    cli::run(store).await
}
