//! Force a working copy back onto its remote branch tip

use std::path::Path;
use tracing::{debug, info};

use crate::error::{ErrorPolicy, SyncError};
use crate::git::GitClient;

/// Discards local divergence with two hard resets: first to the checked-out
/// branch, then to `{remote}/{branch}`.
#[derive(Debug, Clone)]
pub struct RepairStrategy {
    git: GitClient,
    policy: ErrorPolicy,
}

impl RepairStrategy {
    pub fn new(git: GitClient, policy: ErrorPolicy) -> Self {
        Self { git, policy }
    }

    /// Repair the working copy at `dir`.
    ///
    /// Returns `Ok(true)` when both resets succeeded and `Ok(false)` when a
    /// failure was logged and swallowed by the policy. An escalating policy
    /// turns the first failure into `Err`.
    pub async fn repair(&self, dir: &Path) -> Result<bool, SyncError> {
        let (branch, remote) = match self.resolve_target(dir).await {
            Ok(target) => target,
            Err(e) => {
                self.policy.check(e)?;
                return Ok(false);
            }
        };

        info!("Repairing {} against {}/{}", dir.display(), remote, branch);

        let tracking = format!("{}/{}", remote, branch);
        let mut clean = true;
        for target in [branch.as_str(), tracking.as_str()] {
            if let Err(e) = self.git.run_step(dir, &["reset", "--hard", target]).await {
                self.policy.check(e)?;
                clean = false;
            }
        }

        Ok(clean)
    }

    async fn resolve_target(&self, dir: &Path) -> Result<(String, String), SyncError> {
        let branch = self.git.current_branch(dir).await?;
        let remote = self.git.sole_remote(dir).await?;
        debug!("Resolved branch {} and remote {} in {}", branch, remote, dir.display());
        Ok((branch, remote))
    }
}
