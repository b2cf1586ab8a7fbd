use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ValidationError;

static REPO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.]+/[\w\-.]+$").expect("valid repo regex"));

/// A pull request number: non-empty, ASCII digits only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrNumber(String);

impl PrNumber {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::MissingPrNumber);
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NonNumericPrNumber(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An `owner/name` repository slug built from word characters, `-` and `.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug(String);

impl RepoSlug {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if REPO_REGEX.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::MalformedRepo(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of one helper run.
///
/// The helper receives exactly the two validated identifiers as positional
/// arguments, PR number first.
#[derive(Debug, Clone)]
pub struct Invocation {
    pr: PrNumber,
    repo: RepoSlug,
    program: PathBuf,
}

impl Invocation {
    pub fn new(pr: PrNumber, repo: RepoSlug, program: impl Into<PathBuf>) -> Self {
        Self {
            pr,
            repo,
            program: program.into(),
        }
    }

    /// Validate raw request fields and build an invocation.
    ///
    /// `repo` falls back to `default_repo` when absent or empty. The default
    /// is validated like any other input.
    pub fn from_request(
        pr: Option<&str>,
        repo: Option<&str>,
        default_repo: &str,
        program: impl Into<PathBuf>,
    ) -> Result<Self, ValidationError> {
        let pr = PrNumber::parse(pr.unwrap_or_default())?;
        let repo = match repo {
            Some(r) if !r.is_empty() => r,
            _ => default_repo,
        };
        let repo = RepoSlug::parse(repo)?;
        Ok(Self::new(pr, repo, program))
    }

    pub fn pr(&self) -> &PrNumber {
        &self.pr
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> [&str; 2] {
        [self.pr.as_str(), self.repo.as_str()]
    }
}
