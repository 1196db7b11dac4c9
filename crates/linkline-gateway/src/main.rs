// linkline/crates/linkline-gateway/src/main.rs

use clap::Parser;
use dotenvy::dotenv;
use linkline_gateway::{config::Config, run_server};

#[derive(Debug, Parser)]
#[command(name = "linkline-gateway", version, about = "Multi-tenant RAG chat gateway")]
struct Args {
    /// Bind address, overrides API_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides API_PORT / PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut cfg = Config::from_env()?;
    if let Some(host) = args.host {
        cfg.api_host = host;
    }
    if let Some(port) = args.port {
        cfg.api_port = port;
    }

    run_server(cfg).await
}
