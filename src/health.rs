//! Preflight checks behind `starmirror doctor`

use std::path::Path;

use crate::github::{AuthStrategy, Credentials};
use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// GitHub credentials status
    pub github_auth: CheckResult,
    /// Mirror root status
    pub root_dir: CheckResult,
    /// Ledger file status
    pub ledger: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::ok(message)
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::error(message)
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config, token_override: Option<&str>) -> Self {
        let root = config.root_path();
        Self {
            git: Self::check_git(),
            github_auth: Self::check_github_auth(config, token_override),
            root_dir: match &root {
                Ok(root) => Self::check_root_dir(root),
                Err(e) => CheckResult::error_with_details("Invalid root directory", format!("{:#}", e)),
            },
            ledger: match config.ledger_path() {
                Ok(path) => Self::check_ledger(&path),
                Err(_) => CheckResult::error("Ledger location unknown"),
            },
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, r)| r.passed)
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check that some credentials can be found. No API call is made.
    fn check_github_auth(config: &Config, token_override: Option<&str>) -> CheckResult {
        match Credentials::detect(config, token_override) {
            Ok(credentials) if credentials.strategy == AuthStrategy::Anonymous => {
                CheckResult::warning_with_details(
                    "No GitHub credentials",
                    "Listing works for public stars but is heavily rate limited. Set GITHUB_TOKEN or run: gh auth login",
                )
            }
            Ok(credentials) => CheckResult::ok_with_details(
                "GitHub credentials found",
                format!("Strategy: {:?}", credentials.strategy),
            ),
            Err(e) => CheckResult::error_with_details(
                "GitHub authentication failed",
                format!("{:#}\nRun: gh auth login", e),
            ),
        }
    }

    /// Check the mirror root
    fn check_root_dir(root: &Path) -> CheckResult {
        if root.is_dir() {
            CheckResult::ok_with_details("Root directory exists", root.display().to_string())
        } else if root.exists() {
            CheckResult::error_with_details(
                "Root path is not a directory",
                root.display().to_string(),
            )
        } else {
            CheckResult::warning_with_details(
                "Root directory does not exist yet",
                format!("It will be created on the first sync: {}", root.display()),
            )
        }
    }

    /// Check the ledger parses. Read-only: a corrupt ledger is reported, not reset.
    fn check_ledger(path: &Path) -> CheckResult {
        if !path.exists() {
            return CheckResult::warning_with_details(
                "Ledger not created yet",
                path.display().to_string(),
            );
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(entries) => CheckResult::ok_with_details(
                    "Ledger readable",
                    format!("{} entries in {}", entries.len(), path.display()),
                ),
                Err(e) => CheckResult::warning_with_details(
                    "Ledger is corrupt and will be reset on the next sync",
                    e.to_string(),
                ),
            },
            Err(e) => CheckResult::error_with_details("Ledger unreadable", e.to_string()),
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("GitHub Authentication", &self.github_auth),
            ("Root Directory", &self.root_dir),
            ("Ledger", &self.ledger),
        ]
    }
}
