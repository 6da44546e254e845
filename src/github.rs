use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::env;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, GitHubConfig};
use crate::discovery::{RepositoryDescriptor, RepositoryMetadata, RepositorySource};

const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// Attempts per listing page before the listing is given up as truncated
const PAGE_ATTEMPTS: u32 = 3;

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Token passed on the command line
    Explicit,
    /// Use GitHub CLI authentication
    GitHubCLI,
    /// Use environment variable token
    EnvironmentToken,
    /// No credentials; public data only and a much lower rate limit
    Anonymous,
}

/// Credentials resolved for this run
#[derive(Debug, Clone)]
pub struct Credentials {
    pub strategy: AuthStrategy,
    pub token: Option<String>,
}

impl Credentials {
    /// Resolve a token from the override, the GitHub CLI or `GITHUB_TOKEN`,
    /// according to `github.auth_method`.
    pub fn detect(config: &Config, token_override: Option<&str>) -> Result<Self> {
        if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
            return Ok(Self {
                strategy: AuthStrategy::Explicit,
                token: Some(token.trim().to_string()),
            });
        }

        match config.github.auth_method.as_str() {
            "auto" => {
                if let Ok(token) = try_environment_token() {
                    Ok(Self::with(AuthStrategy::EnvironmentToken, token))
                } else if let Ok(token) = try_github_cli() {
                    Ok(Self::with(AuthStrategy::GitHubCLI, token))
                } else {
                    warn!(
                        "No GitHub authentication found, continuing anonymously. \
                         Set GITHUB_TOKEN or run: gh auth login"
                    );
                    Ok(Self {
                        strategy: AuthStrategy::Anonymous,
                        token: None,
                    })
                }
            }
            "gh_cli" => {
                let token =
                    try_github_cli().context("GitHub CLI authentication failed. Run: gh auth login")?;
                Ok(Self::with(AuthStrategy::GitHubCLI, token))
            }
            "token" => {
                let token = try_environment_token()
                    .context("GITHUB_TOKEN environment variable not found or invalid")?;
                Ok(Self::with(AuthStrategy::EnvironmentToken, token))
            }
            other => Err(anyhow!("Unknown auth method: {}", other)),
        }
    }

    fn with(strategy: AuthStrategy, token: String) -> Self {
        Self {
            strategy,
            token: Some(token),
        }
    }
}

/// Try to get token from GitHub CLI
fn try_github_cli() -> Result<String> {
    debug!("Attempting GitHub CLI authentication");

    if !is_command_available("gh") {
        return Err(anyhow!("GitHub CLI (gh) is not installed"));
    }

    let token_output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("Failed to get GitHub CLI token")?;

    if !token_output.status.success() {
        return Err(anyhow!(
            "Failed to retrieve token from GitHub CLI: {}",
            String::from_utf8_lossy(&token_output.stderr).trim()
        ));
    }

    let token = String::from_utf8(token_output.stdout)
        .context("GitHub CLI token is not valid UTF-8")?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(anyhow!("GitHub CLI returned empty token"));
    }

    debug!("Successfully obtained token from GitHub CLI");
    Ok(token)
}

/// Try to get token from environment variable
fn try_environment_token() -> Result<String> {
    debug!("Attempting environment variable authentication");

    let token = env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

    if token.trim().is_empty() {
        return Err(anyhow!("GITHUB_TOKEN is empty"));
    }

    if !token.starts_with("ghp_")
        && !token.starts_with("gho_")
        && !token.starts_with("ghs_")
        && !token.starts_with("github_pat_")
    {
        warn!("GITHUB_TOKEN doesn't look like a GitHub token (expected ghp_, gho_, ghs_ or github_pat_ prefix)");
    }

    Ok(token.trim().to_string())
}

/// Check if a command is available in PATH
pub fn is_command_available(command: &str) -> bool {
    Command::new("which")
        .arg(command)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Work out whose stars to mirror: explicit name, configured name, or the
/// authenticated user.
pub async fn resolve_username(
    config: &Config,
    credentials: &Credentials,
    username_override: Option<&str>,
) -> Result<String> {
    if let Some(name) = username_override.or(config.github.username.as_deref()) {
        return Ok(name.to_string());
    }

    let token = credentials
        .token
        .clone()
        .ok_or_else(|| anyhow!("No username given and no credentials to look one up. Pass --username or set GITHUB_USERNAME"))?;

    let client = Octocrab::builder()
        .personal_token(token)
        .build()
        .context("Failed to create GitHub client")?;

    let user = client
        .current()
        .user()
        .await
        .context("Failed to get current user information. Check your authentication.")?;

    info!("Authenticated as GitHub user: {}", user.login);
    Ok(user.login)
}

#[derive(Debug, Deserialize)]
struct StarredRepo {
    full_name: String,
    clone_url: String,
    #[serde(default)]
    language: Option<String>,
    owner: Owner,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    has_wiki: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoFlags {
    #[serde(default)]
    has_wiki: bool,
}

impl From<StarredRepo> for RepositoryDescriptor {
    fn from(repo: StarredRepo) -> Self {
        RepositoryDescriptor {
            full_name: repo.full_name,
            clone_url: repo.clone_url,
            language: repo.language,
            owner_login: repo.owner.login,
            size_kb: repo.size,
            has_wiki: repo.has_wiki,
        }
    }
}

/// Thin REST client for the two endpoints the mirror needs
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    per_page: u8,
    max_pages: Option<u32>,
    page_cooldown: Duration,
}

impl ApiClient {
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            per_page: config.per_page.max(1),
            max_pages: config.max_pages,
            page_cooldown: config.page_cooldown(),
        })
    }

    async fn get(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, concat!("starmirror/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }
        request.send().await
    }

    /// Lazy pager over `username`'s starred repositories
    pub fn starred(&self, username: &str) -> StarredPager {
        StarredPager {
            api: self.clone(),
            next_url: Some(format!(
                "{}/users/{}/starred?per_page={}&page=1",
                self.base_url, username, self.per_page
            )),
            pages_fetched: 0,
            pending_delay: None,
            truncated: false,
        }
    }
}

#[async_trait]
impl RepositoryMetadata for ApiClient {
    async fn has_wiki(&self, full_name: &str) -> Result<bool> {
        let url = format!("{}/repos/{}", self.base_url, full_name);
        let response = self
            .get(&url)
            .await
            .with_context(|| format!("Failed to fetch metadata for {}", full_name))?;

        let delay = rate_limit_delay(response.headers(), now_epoch(), Duration::ZERO);
        let status = response.status();
        if status != StatusCode::OK {
            bail!("Metadata request for {} returned {}", full_name, status);
        }

        let flags: RepoFlags = response
            .json()
            .await
            .with_context(|| format!("Failed to parse metadata for {}", full_name))?;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(flags.has_wiki)
    }
}

/// Follows `Link: rel="next"` through the starred listing one page at a time
pub struct StarredPager {
    api: ApiClient,
    next_url: Option<String>,
    pages_fetched: u32,
    pending_delay: Option<Duration>,
    truncated: bool,
}

impl StarredPager {
    /// True when the listing ended on an error instead of its last page
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn stop(&mut self) -> Result<Option<Vec<RepositoryDescriptor>>> {
        self.next_url = None;
        Ok(None)
    }

    fn give_up(&mut self) -> Result<Option<Vec<RepositoryDescriptor>>> {
        self.truncated = true;
        self.stop()
    }

    /// GET one page, retrying transport errors and 5xx answers after the cooldown
    async fn fetch(&self, url: &str) -> Option<reqwest::Response> {
        for attempt in 1..=PAGE_ATTEMPTS {
            let failure = match self.api.get(url).await {
                Ok(response) if !response.status().is_server_error() => return Some(response),
                Ok(response) => format!("server answered {}", response.status()),
                Err(e) => e.to_string(),
            };

            if attempt == PAGE_ATTEMPTS {
                warn!(
                    "Giving up on starred repositories after {} attempts: {}",
                    PAGE_ATTEMPTS, failure
                );
                break;
            }
            warn!(
                "Error fetching starred repositories (attempt {}/{}): {}",
                attempt, PAGE_ATTEMPTS, failure
            );
            if !self.api.page_cooldown.is_zero() {
                tokio::time::sleep(self.api.page_cooldown).await;
            }
        }
        None
    }
}

#[async_trait]
impl RepositorySource for StarredPager {
    async fn next_page(&mut self) -> Result<Option<Vec<RepositoryDescriptor>>> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };
        if self
            .api
            .max_pages
            .is_some_and(|max| self.pages_fetched >= max)
        {
            info!("Reached page limit of {}", self.pages_fetched);
            return self.stop();
        }

        if let Some(delay) = self.pending_delay.take() {
            if !delay.is_zero() {
                debug!("Waiting {:?} before the next page", delay);
                tokio::time::sleep(delay).await;
            }
        }

        debug!("Fetching {}", url);
        let Some(response) = self.fetch(&url).await else {
            return self.give_up();
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Starred listing returned {}", status);
            return self.give_up();
        }

        self.pending_delay = Some(rate_limit_delay(
            response.headers(),
            now_epoch(),
            self.api.page_cooldown,
        ));
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);

        let repos: Vec<StarredRepo> = match response.json().await {
            Ok(repos) => repos,
            Err(e) => {
                warn!("Failed to parse starred repositories: {}", e);
                return self.give_up();
            }
        };

        self.pages_fetched += 1;
        if repos.is_empty() {
            return self.stop();
        }

        info!("Fetched page {} with {} repositories", self.pages_fetched, repos.len());
        self.next_url = next;
        Ok(Some(repos.into_iter().map(RepositoryDescriptor::from).collect()))
    }

    fn provider_name(&self) -> &'static str {
        "GitHub"
    }
}

/// URL tagged `rel="next"` in a `Link` header
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let url = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
        if is_next && url.starts_with('<') && url.ends_with('>') {
            Some(url[1..url.len() - 1].to_string())
        } else {
            None
        }
    })
}

/// How long to wait before the next request.
///
/// An exhausted quota waits until `X-RateLimit-Reset`; otherwise `cooldown`.
pub fn rate_limit_delay(headers: &HeaderMap, now: i64, cooldown: Duration) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    match (header("x-ratelimit-remaining"), header("x-ratelimit-reset")) {
        (Some(0), Some(reset)) => {
            let wait = reset.saturating_sub(now).max(0) as u64;
            let at = chrono::DateTime::from_timestamp(reset, 0)
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| reset.to_string());
            warn!("Rate limit exhausted, sleeping {}s until {}", wait, at);
            Duration::from_secs(wait)
        }
        _ => cooldown,
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
