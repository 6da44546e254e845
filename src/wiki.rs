//! One-shot mirroring of companion wikis
//!
//! A wiki is cloned once into `{language}/{owner}@{repo}-Wiki` and never
//! updated afterwards; an existing wiki directory is left untouched.

use tracing::{info, warn};

use crate::discovery::{LocalMirror, RepositoryDescriptor, RepositoryMetadata};
use crate::error::{ErrorPolicy, SyncError};
use crate::git::GitClient;
use crate::progress::printer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WikiOutcome {
    Cloned,
    AlreadyPresent,
    NotEnabled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WikiMirror {
    git: GitClient,
    policy: ErrorPolicy,
    show_progress: bool,
}

impl WikiMirror {
    pub fn new(git: GitClient, policy: ErrorPolicy, show_progress: bool) -> Self {
        Self {
            git,
            policy,
            show_progress,
        }
    }

    pub async fn mirror(
        &self,
        repo: &RepositoryDescriptor,
        local: &LocalMirror,
        metadata: &dyn RepositoryMetadata,
    ) -> Result<WikiOutcome, SyncError> {
        let wiki_path = local.wiki_path();
        if wiki_path.exists() {
            info!("Wiki already mirrored at {}", wiki_path.display());
            return Ok(WikiOutcome::AlreadyPresent);
        }

        match metadata.has_wiki(&repo.full_name).await {
            Ok(true) => {}
            Ok(false) => return Ok(WikiOutcome::NotEnabled),
            Err(e) => {
                warn!("Could not look up wiki flag for {}: {:#}", repo.full_name, e);
                return Ok(WikiOutcome::NotEnabled);
            }
        }

        std::fs::create_dir_all(&local.language_dir)?;
        let target = format!("{}-Wiki", local.folder_name);
        info!("Cloning wiki for {} into {}", repo.full_name, wiki_path.display());

        let mut print = printer(self.show_progress);

        // git creates the target itself and removes it again on failure
        let failure = match self
            .git
            .clone_with_progress(&local.language_dir, &repo.wiki_url(), &target, &mut print)
            .await
        {
            Ok(status) if status.success() => return Ok(WikiOutcome::Cloned),
            Ok(status) => SyncError::NonZeroExit {
                command: format!("clone {}", repo.wiki_url()),
                code: status.code,
                dir: local.language_dir.clone(),
            },
            Err(e) => e,
        };

        self.policy.check(failure)?;
        Ok(WikiOutcome::Failed)
    }
}
