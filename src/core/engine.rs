use crate::domain::model::JobReport;
use crate::domain::ports::SyncJob;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

pub struct JobEngine<J: SyncJob> {
    job: J,
    monitor: SystemMonitor,
}

impl<J: SyncJob> JobEngine<J> {
    pub fn new(job: J) -> Self {
        Self {
            job,
            monitor: SystemMonitor::new(false),
        }
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub async fn run(&self) -> Result<JobReport> {
        let started = Instant::now();
        tracing::info!("🚀 Starting job: {}", self.job.name());
        self.monitor.log_stats("Start");

        let result = self.job.run().await;
        self.monitor.log_stats("Finish");

        match &result {
            Ok(report) => tracing::info!(
                "✅ Job {} finished in {:?} ({})",
                self.job.name(),
                started.elapsed(),
                report
            ),
            Err(e) => tracing::error!("❌ Job {} failed after {:?}: {}", self.job.name(), started.elapsed(), e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SyncError;
    use async_trait::async_trait;

    struct FixedJob(Option<JobReport>);

    #[async_trait]
    impl SyncJob for FixedJob {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn run(&self) -> Result<JobReport> {
            self.0.clone().ok_or(SyncError::ProcessingError {
                message: "no report".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_engine_returns_job_report() {
        let report = JobReport {
            processed: 3,
            updated: 2,
            skipped: 1,
            failed: 0,
        };
        let engine = JobEngine::new(FixedJob(Some(report.clone()))).with_monitor(SystemMonitor::new(true));

        assert_eq!(engine.run().await.unwrap(), report);
        assert_eq!(engine.job().name(), "fixed");
    }

    #[tokio::test]
    async fn test_engine_propagates_job_error() {
        let engine = JobEngine::new(FixedJob(None));
        assert!(engine.run().await.is_err());
    }
}
