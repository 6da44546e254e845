//! starmirror - Mirror starred GitHub repositories to disk
//!
//! starmirror lists the repositories a user has starred and keeps a local
//! mirror of each one under `{root}/{language}/{owner}@{repo}`.
//!
//! ## Core Features
//!
//! - **Reconciliation**: fresh shallow clone, or repair-and-update of an existing mirror
//! - **Live progress**: git's `\r`-delimited progress stream parsed into a structured snapshot
//! - **Wiki mirroring**: companion wikis cloned once into `{owner}@{repo}-Wiki`
//! - **Ledger**: JSON list of mirrored folder names in the root directory
//! - **Error policy**: continue, break or exit on the first git failure
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`discovery`]: Repository descriptors and the collaborator traits
//! - [`github`]: GitHub authentication, starred listing and metadata lookups
//! - [`sync`]: The per-repository reconciliation engine

pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod github;
pub mod health;
pub mod ledger;
pub mod progress;
pub mod repair;
pub mod sync;
pub mod wiki;

pub use config::Config;
pub use discovery::{LocalMirror, RepositoryDescriptor, RepositoryMetadata, RepositorySource, StaticSource};
pub use error::{ErrorPolicy, SyncError};
pub use git::GitClient;
pub use github::{ApiClient, Credentials, StarredPager};
pub use health::HealthCheck;
pub use ledger::Ledger;
pub use progress::{ProgressParser, TransferProgress};
pub use repair::RepairStrategy;
pub use sync::{CloneOutcome, SyncEngine, SyncSummary};
pub use wiki::{WikiMirror, WikiOutcome};
