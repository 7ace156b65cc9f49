use board_sync::adapters::{LocalStorage, MondayClient, ZohoClient};
use board_sync::app::jobs::{AttachmentDownloadJob, ClearColumnJob, EmailMigrationJob, LeadSyncJob};
use board_sync::config::CommonArgs;
use board_sync::core::{CheckpointStore, FileUploader, JobEngine, MailCleaner, UploadLedger};
use board_sync::domain::model::JobReport;
use board_sync::domain::ports::SyncJob;
use board_sync::utils::logger;
use board_sync::utils::monitor::SystemMonitor;
use board_sync::{AppConfig, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "crm-sync")]
#[command(about = "Batch jobs that move CRM data onto board items")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Log CPU and memory usage of the run
    #[arg(long)]
    monitor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy lead owner and notes onto matching board items (resumable)
    Leads {
        #[arg(long, default_value = "Leads")]
        module: String,
    },
    /// Render each record's email history to PDF and upload it
    Emails {
        #[arg(long, default_value = "Leads")]
        module: String,
        /// Field used to name the PDF
        #[arg(long, default_value = "Full_Name")]
        name_field: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Download record attachments, optionally uploading them too
    Attachments {
        #[arg(long, default_value = "PatientsNew")]
        module: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        upload: bool,
    },
    /// Clear a column on every item of a board
    ClearColumn {
        #[arg(long)]
        board: u64,
        #[arg(long)]
        column: String,
    },
}

async fn run_job<J: SyncJob>(job: J, monitor: bool) -> Result<JobReport> {
    if monitor {
        tracing::info!("🔍 System monitoring enabled");
    }
    let engine = JobEngine::new(job).with_monitor(SystemMonitor::new(monitor));
    engine.run().await
}

async fn uploader(config: &AppConfig, monday: &Arc<MondayClient>) -> Result<FileUploader<MondayClient>> {
    let ledger = UploadLedger::load(config.ledger_path()).await?;
    Ok(FileUploader::new(
        Arc::clone(monday),
        config.boards.clone(),
        Arc::new(Mutex::new(ledger)),
    ))
}

async fn execute(config: &AppConfig, command: Command, monitor: bool) -> Result<JobReport> {
    let monday = Arc::new(MondayClient::new(&config.monday)?);

    match command {
        Command::Leads { module } => {
            let crm = Arc::new(ZohoClient::new(config.zoho()?)?);
            let job = LeadSyncJob::new(crm, monday, &config.boards, CheckpointStore::new(config.checkpoint_path()))
                .with_module(module);
            run_job(job, monitor).await
        }
        Command::Emails {
            module,
            name_field,
            limit,
        } => {
            let crm = Arc::new(ZohoClient::new(config.zoho()?)?);
            let job = EmailMigrationJob::new(
                crm,
                uploader(config, &monday).await?,
                MailCleaner::new(&config.mail.notice_patterns)?,
                LocalStorage::new(&config.storage.mails_dir),
                module,
            )
            .with_name_field(name_field)
            .with_limit(limit);
            run_job(job, monitor).await
        }
        Command::Attachments { module, limit, upload } => {
            let crm = Arc::new(ZohoClient::new(config.zoho()?)?);
            let mut job = AttachmentDownloadJob::new(crm, LocalStorage::new(&config.storage.attachments_dir), module)
                .with_limit(limit);
            if upload {
                job = job.with_uploader(uploader(config, &monday).await?);
            }
            run_job(job, monitor).await
        }
        Command::ClearColumn { board, column } => run_job(ClearColumnJob::new(monday, board, column), monitor).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_logger(args.common.verbose, args.common.json_logs);

    let config = match AppConfig::load(&args.common.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code().max(1));
        }
    };

    match execute(&config, args.command, args.monitor).await {
        Ok(report) => {
            println!("✅ Done ({})", report);
        }
        Err(e) => {
            tracing::error!(
                "❌ Job failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
