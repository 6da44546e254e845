//! Repository discovery abstraction layer
//!
//! The orchestrator never talks to a hosting API directly. It pulls
//! [`RepositoryDescriptor`]s page by page from a [`RepositorySource`] and asks
//! a [`RepositoryMetadata`] collaborator for per-repository flags.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Language directory used when the host reports no primary language
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// Provider-agnostic description of one starred repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// "owner/repo"
    pub full_name: String,

    /// HTTPS clone URL
    pub clone_url: String,

    /// Primary language, if the host detected one
    pub language: Option<String>,

    /// Login of the owning user or organisation
    pub owner_login: String,

    /// Repository size as reported by the host, in KB
    pub size_kb: u64,

    /// Wiki flag from the listing, if present. The wiki mirror asks the
    /// metadata collaborator instead of trusting this.
    pub has_wiki: Option<bool>,
}

impl RepositoryDescriptor {
    /// Short repository name (the part after the last '/')
    pub fn short_name(&self) -> &str {
        self.full_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.full_name)
    }

    /// Language directory name, defaulting to "Unknown"
    pub fn language_dir(&self) -> &str {
        match self.language.as_deref() {
            Some(lang) if !lang.trim().is_empty() => lang,
            _ => UNKNOWN_LANGUAGE,
        }
    }

    /// Ledger key and directory name: "{owner}@{repo}"
    pub fn folder_name(&self) -> String {
        format!("{}@{}", self.owner_login, self.short_name())
    }

    /// Clone URL of the companion wiki repository
    pub fn wiki_url(&self) -> String {
        match self.clone_url.strip_suffix(".git") {
            Some(base) => format!("{}.wiki.git", base),
            None => format!("{}.wiki.git", self.clone_url.trim_end_matches('/')),
        }
    }
}

/// Where a repository lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMirror {
    /// `{root}/{language}`
    pub language_dir: PathBuf,
    /// `{owner}@{repo}`
    pub folder_name: String,
    /// `{root}/{language}/{owner}@{repo}`
    pub path: PathBuf,
}

impl LocalMirror {
    pub fn new(root: &Path, repo: &RepositoryDescriptor) -> Self {
        let language_dir = root.join(repo.language_dir());
        let folder_name = repo.folder_name();
        let path = language_dir.join(&folder_name);
        Self {
            language_dir,
            folder_name,
            path,
        }
    }

    /// Whether the mirror directory carries a `.git` marker
    pub fn has_marker(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// `{root}/{language}/{owner}@{repo}-Wiki`
    pub fn wiki_path(&self) -> PathBuf {
        self.language_dir.join(format!("{}-Wiki", self.folder_name))
    }
}

/// Lazy, paginated supply of repository descriptors
#[async_trait]
pub trait RepositorySource: Send {
    /// Next page of descriptors, or `None` once the listing is exhausted
    async fn next_page(&mut self) -> Result<Option<Vec<RepositoryDescriptor>>>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}

/// Per-repository metadata lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryMetadata: Send + Sync {
    /// Whether the repository has its wiki feature enabled
    async fn has_wiki(&self, full_name: &str) -> Result<bool>;
}

/// A fixed list of descriptors served as a single page
pub struct StaticSource {
    repos: Option<Vec<RepositoryDescriptor>>,
}

impl StaticSource {
    pub fn new(repos: Vec<RepositoryDescriptor>) -> Self {
        Self { repos: Some(repos) }
    }
}

#[async_trait]
impl RepositorySource for StaticSource {
    async fn next_page(&mut self) -> Result<Option<Vec<RepositoryDescriptor>>> {
        Ok(self.repos.take().filter(|repos| !repos.is_empty()))
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}
