//! Backup run executor - drives one pass over every configured backup type.
//!
//! Per job: locate source -> compress -> upload -> prune -> report.
//! - a failed step marks the job FAILURE and skips to reporting
//! - the local archive is removed whatever happens after compression
//! - pruning runs once an archive exists, even if its upload failed
//! - a reporting failure aborts the whole run
//! - a FAILURE stops later backup types unless `continue_on_failure` is set

pub mod job;

use crate::archive::Archiver;
use crate::config::{BackupType, Settings, SiteConfig};
use crate::report::{SpreadsheetClient, StatusReporter};
use crate::source::SourceLocator;
use crate::transport::{retention, Transport};
use crate::utils::errors::Result;
use crate::utils::logger;
use job::{BackupJob, JobStage, JobStatus};
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything a run needs, passed explicitly to each component.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub settings: Settings,
    pub site: SiteConfig,
}

impl RunContext {
    pub fn new(settings: Settings, site: SiteConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings,
            site,
        }
    }
}

/// Final state of one processed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub backup_type: BackupType,
    pub status: JobStatus,
    pub stage: JobStage,
}

/// Result of a completed (not aborted by a reporting failure) run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub jobs: Vec<JobOutcome>,
    /// Configured types never started because an earlier job failed
    pub skipped: Vec<BackupType>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.skipped.is_empty() && self.jobs.iter().all(|j| j.status == JobStatus::Success)
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

/// Main backup executor
pub struct BackupExecutor<T, C> {
    ctx: RunContext,
    locator: SourceLocator,
    archiver: Archiver,
    transport: T,
    reporter: StatusReporter<C>,
}

impl<T: Transport, C: SpreadsheetClient> BackupExecutor<T, C> {
    pub fn new(ctx: RunContext, transport: T, sheets: C) -> Self {
        let locator = SourceLocator::new(ctx.settings.sources.clone());
        let archiver = Archiver::new(
            ctx.settings.scratch_dir.clone(),
            Duration::from_secs(ctx.settings.archive_timeout_secs),
        );
        Self {
            ctx,
            locator,
            archiver,
            transport,
            reporter: StatusReporter::new(sheets),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn reporter(&self) -> &StatusReporter<C> {
        &self.reporter
    }

    /// Process every configured backup type once, in order.
    ///
    /// Returns `Err` only for failures fatal to the run (reporting).
    pub async fn run_once(&self) -> Result<RunSummary> {
        let settings = &self.ctx.settings;
        let site = &self.ctx.site;

        info!(
            "Starting backup run {} for site {} ({} backup types)",
            self.ctx.run_id,
            site.site,
            site.backup_types.len()
        );

        // Checked once; every job fails fast if the remote is missing
        let remote_error = match self.transport.ensure_remote().await {
            Ok(()) => None,
            Err(e) => {
                error!("{}", e);
                Some(e.to_string())
            }
        };

        let mut summary = RunSummary {
            run_id: self.ctx.run_id,
            jobs: Vec::with_capacity(site.backup_types.len()),
            skipped: Vec::new(),
        };

        for (index, backup_type) in site.backup_types.iter().copied().enumerate() {
            let timestamp = chrono::Local::now().naive_local();
            let mut job = BackupJob::new(backup_type, site, settings, timestamp);

            let span = info_span!("job", backup_type = %backup_type, site = %site.site);
            self.run_job(&mut job, remote_error.as_deref())
                .instrument(span)
                .await?;

            summary.jobs.push(JobOutcome {
                backup_type,
                status: job.status(),
                stage: job.stage,
            });

            if job.status() == JobStatus::Failure && !settings.continue_on_failure {
                summary.skipped = site.backup_types[index + 1..].to_vec();
                if !summary.skipped.is_empty() {
                    warn!(
                        "Backup {} failed, stopping run; not processed: {:?}",
                        backup_type, summary.skipped
                    );
                }
                break;
            }
        }

        info!(
            "Backup run {} finished: {} job(s), {} skipped",
            self.ctx.run_id,
            summary.jobs.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn run_job(&self, job: &mut BackupJob, remote_error: Option<&str>) -> Result<()> {
        match remote_error {
            Some(reason) => {
                error!("Skipping {} backup: {}", job.backup_type, reason);
                job.settle(JobStatus::Failure);
            }
            None => self.back_up(job).await,
        }

        self.report(job).await
    }

    /// Locate, compress, upload and prune. Never fails: errors settle the job.
    async fn back_up(&self, job: &mut BackupJob) {
        let source = match self.locator.locate(job.backup_type) {
            Ok(path) => path,
            Err(e) => {
                error!("{}", e);
                job.settle(JobStatus::Failure);
                return;
            }
        };
        job.advance(JobStage::SourceResolved);

        let archive = match self.archiver.compress(&source, &job.archive_name).await {
            Ok(archive) => archive,
            Err(e) => {
                error!("{}", e);
                job.settle(JobStatus::Failure);
                return;
            }
        };
        job.advance(JobStage::Archived);

        match self.transport.upload(archive.path(), &job.destination_uri).await {
            Ok(()) => {
                job.settle(JobStatus::Success);
                job.advance(JobStage::Uploaded);
            }
            Err(e) => {
                error!("{}", e);
                job.settle(JobStatus::Failure);
            }
        }
        drop(archive);

        self.prune(job).await;
    }

    async fn prune(&self, job: &mut BackupJob) {
        let present = match self
            .transport
            .list(&job.destination_uri, &job.name_prefix)
            .await
        {
            Ok(files) => files,
            Err(e) => {
                error!("Managing backups failed: {}", e);
                return;
            }
        };

        info!("Current backups present:");
        for file in &present {
            info!("    {}", file);
        }

        retention::prune(
            &self.transport,
            &job.destination_uri,
            &present,
            self.ctx.settings.keep_count,
        )
        .await;
        job.advance(JobStage::Pruned);
    }

    async fn report(&self, job: &mut BackupJob) -> Result<()> {
        let log = logger::read_log(&self.ctx.settings.log_file)
            .unwrap_or_else(|e| format!("[log file unreadable: {}]", e));

        let result = self
            .reporter
            .report(
                &job.tab_name,
                job.status(),
                &self.ctx.site.google_backup_account,
                &job.spreadsheet_id,
                &log,
            )
            .await;

        match result {
            Ok(()) => {
                job.advance(JobStage::Reported);
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }
}
