use std::path::PathBuf;

use clap::Parser;
use rmp_assistant::config::Config;
use rmp_assistant::error::Result;
use rmp_assistant::server;

#[derive(Parser, Debug)]
#[command(name = "rmp-assistantd")]
#[command(about = "Rate My Professor assistant chat server")]
struct Cli {
    #[arg(long, env = "RMP_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    rmp_assistant::logging::init_tracing("rmp_assistantd");
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    server::run_with_shutdown(&config, shutdown).await
}
