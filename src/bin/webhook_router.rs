use board_sync::app::router;
use board_sync::config::CommonArgs;
use board_sync::utils::logger;
use board_sync::AppConfig;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "webhook-router")]
#[command(about = "Forwards board webhooks to the service registered for each board")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Override the listen port from the config file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_logger(args.common.verbose, args.common.json_logs);

    let config = AppConfig::load(&args.common.config).and_then(|config| config.router().cloned());
    let mut router_config = match config {
        Ok(router_config) => router_config,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code().max(1));
        }
    };

    if let Some(port) = args.port {
        router_config.port = port;
    }

    for route in &router_config.routes {
        tracing::info!("🔀 Board {} → {}", route.board_id, route.target);
    }

    if let Err(e) = router::serve(&router_config).await {
        tracing::error!("❌ Webhook router stopped: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code().max(1));
    }

    Ok(())
}
