use board_sync::app::webhook;
use board_sync::config::CommonArgs;
use board_sync::utils::logger;
use board_sync::AppConfig;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "board-sync")]
#[command(about = "Receives board webhooks and copies uploaded files to every item with the same email")]
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

    // 初始化日誌
    logger::init_logger(args.common.verbose, args.common.json_logs);

    tracing::info!("🚀 Starting board-sync webhook server");
    tracing::info!("📁 Loading configuration from: {}", args.common.config);

    let mut config = match AppConfig::load(&args.common.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code().max(1));
        }
    };

    if let Some(port) = args.port {
        config.webhook.port = port;
        tracing::info!("🔧 Port overridden to: {}", port);
    }

    tracing::info!(
        "📊 {} board(s) configured, email column: {}, file column: {}",
        config.boards.len(),
        config.webhook.email_column,
        config.webhook.file_column
    );

    if let Err(e) = webhook::serve(&config).await {
        tracing::error!(
            "❌ Webhook server stopped: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code().max(1));
    }

    Ok(())
}
