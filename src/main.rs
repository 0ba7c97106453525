use anyhow::{Context, Result};
use tracing::error;

use feedrow::app::{DemoArgs, FeedRowApp};
use feedrow::config::AppConfig;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feedrow=info".parse().unwrap()),
        )
        .init();

    if let Err(e) = run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = DemoArgs::parse(std::env::args().skip(1))?;
    let config = AppConfig::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("feedrow")
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let app = FeedRowApp::new(config)?;
        app.run(args).await
    })
}
