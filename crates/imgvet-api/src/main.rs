use anyhow::Result;
use imgvet_api::setup::{initialize_app, server};
use imgvet_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    let (_state, app) = initialize_app(config.clone()).await?;
    server::start_server(&config, app).await
}
