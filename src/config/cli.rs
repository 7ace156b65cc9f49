use clap::Args;

/// 所有執行檔共用的命令列參數
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "board-sync.toml", env = "BOARD_SYNC_CONFIG")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}
