//! Failure taxonomy for mirroring and the policy that decides how far a
//! failure travels.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Everything that can go wrong while mirroring a single repository
#[derive(Debug, Error)]
pub enum SyncError {
    /// `git` ran but reported failure
    #[error("`git {command}` exited with {} in {}", describe_code(.code), .dir.display())]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        dir: PathBuf,
    },

    /// `git` could not be started at all
    #[error("failed to launch `git {command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Ledger file exists but does not hold a JSON array of strings
    #[error("ledger {} is corrupt and will be reset: {source}", .path.display())]
    LedgerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A mirror directory or ledger entry without a `.git` marker
    #[error("{} is not a valid git mirror, leaving it alone", .path.display())]
    AmbiguousState { path: PathBuf },

    /// The working copy does not have exactly one checked-out branch and one remote
    #[error("cannot repair {}: {detail}", .path.display())]
    RepairPrecondition { path: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// How a subprocess failure is escalated.
///
/// Every failure site hands its error to [`ErrorPolicy::check`]; the policy
/// either swallows it after logging or returns it to abort the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Log the failure and keep going
    #[default]
    Continue,
    /// Stop after the current repository, still reporting a summary
    Break,
    /// Abort the whole run immediately
    Exit,
}

impl ErrorPolicy {
    /// Log `failure` and decide whether it propagates
    pub fn check(self, failure: SyncError) -> Result<(), SyncError> {
        match self {
            ErrorPolicy::Continue => {
                warn!("{}", failure);
                Ok(())
            }
            ErrorPolicy::Break | ErrorPolicy::Exit => {
                error!("{}", failure);
                Err(failure)
            }
        }
    }
}
