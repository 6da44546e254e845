//! Common test utilities: local upstream repositories served over file:// URLs
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use starmirror::{Config, RepositoryDescriptor, RepositoryMetadata};

/// Run git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Fixture Author",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Temporary upstream repositories plus an empty mirror root
pub struct GitFixture {
    pub temp_dir: TempDir,
    pub upstream_root: PathBuf,
    pub mirror_root: PathBuf,
}

impl GitFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let upstream_root = temp_dir.path().join("upstream");
        let mirror_root = temp_dir.path().join("mirror");
        std::fs::create_dir_all(&upstream_root).expect("Failed to create upstream dir");
        std::fs::create_dir_all(&mirror_root).expect("Failed to create mirror dir");

        Self {
            temp_dir,
            upstream_root,
            mirror_root,
        }
    }

    fn upstream_dir(&self, owner: &str, repo_dir: &str) -> PathBuf {
        self.upstream_root.join(owner).join(repo_dir)
    }

    fn init_repo(&self, dir: &Path, file: &str, contents: &str) {
        std::fs::create_dir_all(dir).expect("Failed to create upstream repo dir");
        git(dir, &["init", "--quiet"]);
        std::fs::write(dir.join(file), contents).expect("Failed to write file");
        git(dir, &["add", "."]);
        git(dir, &["commit", "--quiet", "-m", "Initial commit"]);
    }

    /// Create `owner/name.git` (and `owner/name.wiki.git` when `with_wiki`)
    pub fn create_upstream(&self, owner: &str, name: &str, with_wiki: bool) {
        self.init_repo(
            &self.upstream_dir(owner, &format!("{}.git", name)),
            "README.md",
            &format!("# {}\n", name),
        );
        if with_wiki {
            self.init_repo(
                &self.upstream_dir(owner, &format!("{}.wiki.git", name)),
                "Home.md",
                "Welcome to the wiki\n",
            );
        }
    }

    /// Add a commit to an existing upstream
    pub fn commit_upstream(&self, owner: &str, name: &str, file: &str, contents: &str) {
        let dir = self.upstream_dir(owner, &format!("{}.git", name));
        std::fs::write(dir.join(file), contents).expect("Failed to write file");
        git(&dir, &["add", "."]);
        git(&dir, &["commit", "--quiet", "-m", &format!("Update {}", file)]);
    }

    pub fn clone_url(&self, owner: &str, name: &str) -> String {
        format!(
            "file://{}",
            self.upstream_dir(owner, &format!("{}.git", name)).display()
        )
    }

    pub fn descriptor(&self, owner: &str, name: &str, language: Option<&str>) -> RepositoryDescriptor {
        RepositoryDescriptor {
            full_name: format!("{}/{}", owner, name),
            clone_url: self.clone_url(owner, name),
            language: language.map(str::to_string),
            owner_login: owner.to_string(),
            size_kb: 4,
            has_wiki: None,
        }
    }

    /// Configuration pointing at the mirror root with quiet progress
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.root_directory = self.mirror_root.display().to_string();
        config.sync.show_progress = false;
        config.sync.mirror_wikis = false;
        config
    }

    pub fn mirror_path(&self, language: &str, folder: &str) -> PathBuf {
        self.mirror_root.join(language).join(folder)
    }

    pub fn ledger_entries(&self) -> Vec<String> {
        let content = std::fs::read_to_string(self.mirror_root.join("cloned_repos.json"))
            .expect("Failed to read ledger");
        serde_json::from_str(&content).expect("Ledger is not a JSON array")
    }
}

/// Metadata collaborator answering from a fixed set of wiki-enabled repositories
#[derive(Default)]
pub struct StaticMetadata {
    wikis: HashSet<String>,
}

impl StaticMetadata {
    pub fn with_wikis(names: &[&str]) -> Self {
        Self {
            wikis: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RepositoryMetadata for StaticMetadata {
    async fn has_wiki(&self, full_name: &str) -> Result<bool> {
        Ok(self.wikis.contains(full_name))
    }
}
