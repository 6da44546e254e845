//! Sync Engine - per-repository reconciliation
//!
//! For each descriptor the engine decides between a fresh clone, a
//! repair-and-update of an existing mirror, or leaving an ambiguous directory
//! alone. Repositories are processed strictly one after another in the order
//! the source yields them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::{LocalMirror, RepositoryDescriptor, RepositoryMetadata, RepositorySource};
use crate::error::{ErrorPolicy, SyncError};
use crate::git::{GitClient, UPDATE_STEPS};
use crate::ledger::Ledger;
use crate::progress::printer;
use crate::repair::RepairStrategy;
use crate::wiki::{WikiMirror, WikiOutcome};

/// What happened to one repository's main mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// Freshly cloned and recorded in the ledger
    Success,
    /// Existing mirror repaired and updated
    AlreadyPresent,
    /// Clone exited non-zero or could not be launched
    TransferFailed,
    /// Existing mirror could not be repaired; update was still attempted
    RepairFailed,
    /// Directory exists without a marker, or ledger entry without a mirror
    LeftAlone,
}

#[derive(Debug, Clone)]
pub struct RepoReport {
    pub full_name: String,
    pub folder_name: String,
    pub outcome: CloneOutcome,
    pub wiki: Option<WikiOutcome>,
}

/// Results from a complete sync operation
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub already_present: usize,
    pub transfer_failed: usize,
    pub repair_failed: usize,
    pub left_alone: usize,
    pub wikis_cloned: usize,
    /// Set when an escalating `break` policy stopped the run early
    pub halted: bool,
    pub halted_on: Option<String>,
    pub duration: Duration,
    pub reports: Vec<RepoReport>,
}

impl SyncSummary {
    fn record(&mut self, report: RepoReport) {
        match report.outcome {
            CloneOutcome::Success => self.cloned += 1,
            CloneOutcome::AlreadyPresent => self.already_present += 1,
            CloneOutcome::TransferFailed => self.transfer_failed += 1,
            CloneOutcome::RepairFailed => self.repair_failed += 1,
            CloneOutcome::LeftAlone => self.left_alone += 1,
        }
        if report.wiki == Some(WikiOutcome::Cloned) {
            self.wikis_cloned += 1;
        }
        self.reports.push(report);
    }

    pub fn failures(&self) -> usize {
        self.transfer_failed + self.repair_failed
    }
}

/// The main sync engine that drives every repository to a mirrored state
pub struct SyncEngine {
    root: PathBuf,
    ledger: Ledger,
    git: GitClient,
    repair: RepairStrategy,
    wiki: Option<WikiMirror>,
    policy: ErrorPolicy,
    show_progress: bool,
}

impl SyncEngine {
    /// Create an engine rooted at the configured root directory
    pub fn new(config: &Config) -> Result<Self> {
        let root = config.root_path()?;
        Ok(Self::with_root(config, root))
    }

    /// Create an engine rooted at `root`, which must be absolute
    pub fn with_root(config: &Config, root: PathBuf) -> Self {
        let policy = config.sync.error_policy;
        let git = GitClient::new(config.sync.clone_depth);
        let wiki = config
            .sync
            .mirror_wikis
            .then(|| WikiMirror::new(git.clone(), policy, config.sync.show_progress));

        Self {
            ledger: Ledger::in_root(&root, &config.sync.ledger_file),
            repair: RepairStrategy::new(git.clone(), policy),
            root,
            git,
            wiki,
            policy,
            show_progress: config.sync.show_progress,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Mirror everything `source` yields.
    ///
    /// Under `exit` the first escalated failure aborts with an error; under
    /// `break` the run stops and the partial summary is returned.
    pub async fn run(
        &self,
        source: &mut dyn RepositorySource,
        metadata: &dyn RepositoryMetadata,
    ) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut summary = SyncSummary::default();

        info!(
            "Mirroring starred repositories from {} into {}",
            source.provider_name(),
            self.root.display()
        );
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create root directory {}", self.root.display()))?;

        'pages: while let Some(page) = source
            .next_page()
            .await
            .context("Failed to list repositories")?
        {
            for repo in page {
                summary.total_repositories += 1;
                narrate(summary.total_repositories, &repo);

                match self.process(&repo, metadata).await {
                    Ok(report) => summary.record(report),
                    Err(e) => match self.policy {
                        ErrorPolicy::Exit => {
                            return Err(e).with_context(|| {
                                format!("Aborting run while mirroring {}", repo.full_name)
                            });
                        }
                        ErrorPolicy::Continue => {
                            warn!("Skipping {}: {}", repo.full_name, e);
                        }
                        ErrorPolicy::Break => {
                            error!("Stopping after failure in {}", repo.full_name);
                            summary.halted = true;
                            summary.halted_on = Some(repo.full_name.clone());
                            break 'pages;
                        }
                    },
                }
            }
        }

        summary.duration = start_time.elapsed();
        info!(
            "Sync completed in {:.2}s: {} cloned, {} updated, {} failed, {} left alone",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.already_present,
            summary.failures(),
            summary.left_alone
        );

        Ok(summary)
    }

    async fn process(
        &self,
        repo: &RepositoryDescriptor,
        metadata: &dyn RepositoryMetadata,
    ) -> Result<RepoReport, SyncError> {
        let outcome = self.mirror_repository(repo).await?;

        let wiki = match &self.wiki {
            Some(wiki) => {
                let local = LocalMirror::new(&self.root, repo);
                Some(wiki.mirror(repo, &local, metadata).await?)
            }
            None => None,
        };

        Ok(RepoReport {
            full_name: repo.full_name.clone(),
            folder_name: repo.folder_name(),
            outcome,
            wiki,
        })
    }

    /// Drive one repository's main mirror to a consistent state.
    ///
    /// Only returns `Err` when the policy escalates a failure.
    pub async fn mirror_repository(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<CloneOutcome, SyncError> {
        let local = LocalMirror::new(&self.root, repo);
        let in_ledger = self.ledger.contains(&local.folder_name)?;

        if local.has_marker() {
            return self.refresh_existing(&local).await;
        }

        if in_ledger {
            info!("{} is in the ledger but has no marker", local.folder_name);
            self.policy.check(SyncError::AmbiguousState {
                path: local.path.clone(),
            })?;
            return Ok(CloneOutcome::LeftAlone);
        }

        if !is_empty_dir(&local.path)? {
            warn!(
                "{}",
                SyncError::AmbiguousState {
                    path: local.path.clone()
                }
            );
            return Ok(CloneOutcome::LeftAlone);
        }

        self.clone_fresh(repo, &local).await
    }

    async fn refresh_existing(&self, local: &LocalMirror) -> Result<CloneOutcome, SyncError> {
        info!("Repository {} already exists, updating", local.folder_name);

        let repaired = self.repair.repair(&local.path).await?;
        self.update(&local.path).await?;

        if self.ledger.ensure(&local.folder_name)? {
            info!("Recorded existing mirror {} in the ledger", local.folder_name);
        }

        Ok(if repaired {
            CloneOutcome::AlreadyPresent
        } else {
            CloneOutcome::RepairFailed
        })
    }

    async fn clone_fresh(
        &self,
        repo: &RepositoryDescriptor,
        local: &LocalMirror,
    ) -> Result<CloneOutcome, SyncError> {
        std::fs::create_dir_all(&local.path)?;
        info!("Cloning {} into {}", repo.full_name, local.path.display());

        let mut print = printer(self.show_progress);
        let transfer = self
            .git
            .clone_with_progress(&local.path, &repo.clone_url, ".", &mut print)
            .await;

        let outcome = match transfer {
            Ok(status) if status.success() => {
                self.ledger.append(&local.folder_name)?;
                info!(
                    "Cloned {} ({} objects, {} deltas)",
                    repo.full_name, status.progress.total_objects, status.progress.total_deltas
                );
                CloneOutcome::Success
            }
            Ok(status) => {
                self.policy.check(SyncError::NonZeroExit {
                    command: format!("clone {}", repo.clone_url),
                    code: status.code,
                    dir: local.path.clone(),
                })?;
                CloneOutcome::TransferFailed
            }
            Err(e) => {
                self.policy.check(e)?;
                CloneOutcome::TransferFailed
            }
        };

        if local.has_marker() {
            debug!("Running post-clone repair on {}", local.path.display());
            self.repair.repair(&local.path).await?;
        }

        Ok(outcome)
    }

    /// Run the update sequence in `dir`. Returns whether every step succeeded.
    pub async fn update(&self, dir: &Path) -> Result<bool, SyncError> {
        let mut clean = true;
        for step in UPDATE_STEPS {
            if let Err(e) = self.git.run_step(dir, step).await {
                self.policy.check(e)?;
                clean = false;
            }
        }
        Ok(clean)
    }
}

fn narrate(index: usize, repo: &RepositoryDescriptor) {
    info!(
        "#{} {} | {} | language: {} | size: {} KB | owner: {}",
        index,
        repo.full_name,
        repo.clone_url,
        repo.language_dir(),
        repo.size_kb,
        repo.owner_login
    );
}

/// True when `path` is missing or an empty directory
fn is_empty_dir(path: &Path) -> Result<bool, SyncError> {
    if !path.exists() {
        return Ok(true);
    }
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(std::fs::read_dir(path)?.next().is_none())
}
