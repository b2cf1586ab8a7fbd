//! Layered configuration for bunnify.
//!
//! Settings come from `bunnify.toml`, then `BUNNIFY_*` environment variables
//! (a `.env` file is loaded into the environment at startup), then CLI flags.
//! A missing file means defaults throughout.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! dev_mode = false
//! public_url = "http://bunnify.local"
//!
//! [bookmarks]
//! file = "bookmarks.json"
//! watch = true
//! watch_interval_secs = 2
//!
//! [review]
//! helper = "scripts/get_copilot_review.sh"
//! default_repo = "shop/world"
//! poll_interval_ms = 100
//! drain_timeout_secs = 5
//! start_marker = "---PAYLOAD_START---"
//! end_marker = "---PAYLOAD_END---"
//!
//! [[review.phases]]
//! trigger = "Waiting for Copilot"
//! tag = "waiting"
//! label = "Waiting for Copilot response (max 60s)..."
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! directory = "logs"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::relay::extract::{DEFAULT_END_MARKER, DEFAULT_START_MARKER};
use crate::relay::{Markers, PhaseRule, PhaseTable, RelayOptions, RepoSlug};

pub const CONFIG_FILE_NAME: &str = "bunnify.toml";
const ENV_PREFIX: &str = "BUNNIFY_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for local front-end work
    #[serde(default)]
    pub dev_mode: bool,
    /// Externally visible base URL used in suggestion links
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
            public_url: None,
        }
    }
}

impl ServerSection {
    /// `public_url` without a trailing slash, else `http://host:port`.
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarksSection {
    /// JSON file the bookmark store is loaded from
    #[serde(default = "default_bookmarks_file")]
    pub file: PathBuf,
    /// Reload the store when the file changes
    #[serde(default = "default_true")]
    pub watch: bool,
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_bookmarks_file() -> PathBuf {
    PathBuf::from("bookmarks.json")
}

fn default_true() -> bool {
    true
}

fn default_watch_interval() -> u64 {
    2
}

impl Default for BookmarksSection {
    fn default() -> Self {
        Self {
            file: default_bookmarks_file(),
            watch: true,
            watch_interval_secs: default_watch_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSection {
    /// Program run as `<helper> <pr> <repo>`
    #[serde(default = "default_helper")]
    pub helper: PathBuf,
    /// Repository used when a request names none
    #[serde(default = "default_repo")]
    pub default_repo: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for the output pipe to close after the helper exits
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_start_marker")]
    pub start_marker: String,
    #[serde(default = "default_end_marker")]
    pub end_marker: String,
    /// Ordered phase triggers; replaces the built-in table when non-empty
    #[serde(default)]
    pub phases: Vec<PhaseRule>,
}

fn default_helper() -> PathBuf {
    PathBuf::from("scripts/get_copilot_review.sh")
}

fn default_repo() -> String {
    "shop/world".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_drain_timeout_secs() -> u64 {
    5
}

fn default_start_marker() -> String {
    DEFAULT_START_MARKER.to_string()
}

fn default_end_marker() -> String {
    DEFAULT_END_MARKER.to_string()
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            helper: default_helper(),
            default_repo: default_repo(),
            poll_interval_ms: default_poll_interval_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            start_marker: default_start_marker(),
            end_marker: default_end_marker(),
            phases: Vec::new(),
        }
    }
}

impl ReviewSection {
    pub fn markers(&self) -> Markers {
        Markers {
            start: self.start_marker.clone(),
            end: self.end_marker.clone(),
        }
    }

    pub fn phase_table(&self) -> PhaseTable {
        if self.phases.is_empty() {
            PhaseTable::default()
        } else {
            PhaseTable::new(self.phases.clone())
        }
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write daily-rolling log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

/// The complete bunnify.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BunnifyToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bookmarks: BookmarksSection,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BunnifyToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse bunnify.toml")
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize bunnify.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Overlay `BUNNIFY_*` variables from `vars`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "HOST" => self.server.host = value,
                "PORT" => {
                    self.server.port = value
                        .parse()
                        .with_context(|| format!("Invalid {key} '{value}'"))?
                }
                "DEV" => self.server.dev_mode = is_truthy(&value),
                "BOOKMARKS" => self.bookmarks.file = PathBuf::from(value),
                "WATCH" => self.bookmarks.watch = is_truthy(&value),
                "HELPER" => self.review.helper = PathBuf::from(value),
                "DEFAULT_REPO" => self.review.default_repo = value,
                "POLL_INTERVAL_MS" => {
                    self.review.poll_interval_ms = value
                        .parse()
                        .with_context(|| format!("Invalid {key} '{value}'"))?
                }
                "LOG_LEVEL" => self.logging.level = value,
                "LOG_FORMAT" => self.logging.format = value.parse()?,
                "LOG_DIR" => self.logging.directory = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if RepoSlug::parse(&self.review.default_repo).is_err() {
            warnings.push(format!(
                "Invalid default_repo '{}': should be 'owner/name'",
                self.review.default_repo
            ));
        }
        if self.review.poll_interval_ms == 0 {
            warnings.push("poll_interval_ms is 0; the relay will spin while idle".to_string());
        }
        if self.review.start_marker.is_empty() || self.review.end_marker.is_empty() {
            warnings.push("Payload markers must not be empty".to_string());
        } else if self.review.start_marker == self.review.end_marker {
            warnings.push(format!(
                "start_marker and end_marker are both '{}'",
                self.review.start_marker
            ));
        }
        for (i, rule) in self.review.phases.iter().enumerate() {
            if rule.trigger.is_empty() {
                warnings.push(format!(
                    "review.phases[{}] ('{}') has an empty trigger and matches every line",
                    i, rule.tag
                ));
            }
        }
        if self.bookmarks.watch && self.bookmarks.watch_interval_secs == 0 {
            warnings.push("watch_interval_secs must be at least 1".to_string());
        }
        if self.logging.level.trim().is_empty() {
            warnings.push("logging.level is empty".to_string());
        }

        warnings
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Where the config file is read from: an explicit path, else
/// `./bunnify.toml`, else the user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("bunnify").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

/// CLI overrides, the last configuration layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub bookmarks: Option<PathBuf>,
    pub helper: Option<PathBuf>,
    pub dev: bool,
}

/// Fully merged configuration.
#[derive(Debug, Clone)]
pub struct BunnifyConfig {
    /// File the settings were read from (may not exist)
    pub source: PathBuf,
    pub toml: BunnifyToml,
}

impl BunnifyConfig {
    /// file → environment → CLI
    pub fn load(explicit: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let source = resolve_config_path(explicit);
        if explicit.is_some() && !source.exists() {
            anyhow::bail!("Config file not found: {}", source.display());
        }
        let mut toml = BunnifyToml::load_or_default(&source)?;
        toml.apply_env(std::env::vars())?;
        Self::apply_cli(&mut toml, cli);
        Ok(Self { source, toml })
    }

    fn apply_cli(toml: &mut BunnifyToml, cli: &CliOverrides) {
        if let Some(host) = &cli.host {
            toml.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            toml.server.port = port;
        }
        if let Some(bookmarks) = &cli.bookmarks {
            toml.bookmarks.file = bookmarks.clone();
        }
        if let Some(helper) = &cli.helper {
            toml.review.helper = helper.clone();
        }
        if cli.dev {
            toml.server.dev_mode = true;
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_empty_gives_defaults() {
        let toml = BunnifyToml::parse("").unwrap();
        assert_eq!(toml.server.port, 8000);
        assert_eq!(toml.server.host, "127.0.0.1");
        assert_eq!(toml.review.default_repo, "shop/world");
        assert_eq!(toml.review.start_marker, "---PAYLOAD_START---");
        assert_eq!(toml.logging.format, LogFormat::Pretty);
        assert!(toml.bookmarks.watch);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_review_section() {
        let content = r#"
[review]
helper = "/opt/review.sh"
default_repo = "acme/widgets"
poll_interval_ms = 250
start_marker = "<<<"
end_marker = ">>>"

[[review.phases]]
trigger = "step:"
tag = "step"
label = "Running step"
"#;
        let toml = BunnifyToml::parse(content).unwrap();
        assert_eq!(toml.review.helper, PathBuf::from("/opt/review.sh"));
        assert_eq!(
            toml.review.relay_options().poll_interval,
            Duration::from_millis(250)
        );
        assert_eq!(toml.review.markers().start, "<<<");
        let table = toml.review.phase_table();
        assert_eq!(table.rules().len(), 1);
        assert_eq!(table.lookup("step: lint").unwrap().tag, "step");
    }

    #[test]
    fn test_empty_phase_list_uses_builtin_table() {
        let toml = BunnifyToml::default();
        assert_eq!(toml.review.phase_table(), PhaseTable::default());
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(BunnifyToml::parse("[server\nport = ").is_err());
        assert!(BunnifyToml::parse("[server]\nport = \"eighty\"").is_err());
    }

    #[test]
    fn test_validate_reports_problems() {
        let content = r#"
[review]
default_repo = "not a repo"
start_marker = "==="
end_marker = "==="

[[review.phases]]
trigger = ""
tag = "all"
label = "Everything"
"#;
        let warnings = BunnifyToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("not a repo"));
        assert!(warnings[2].contains("empty trigger"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = BunnifyToml::parse("[server]\nport = 9000\n").unwrap();
        toml.apply_env(env(&[
            ("BUNNIFY_PORT", "9100"),
            ("BUNNIFY_DEV", "true"),
            ("BUNNIFY_HELPER", "/usr/local/bin/review"),
            ("BUNNIFY_LOG_FORMAT", "json"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(toml.server.port, 9100);
        assert!(toml.server.dev_mode);
        assert_eq!(toml.review.helper, PathBuf::from("/usr/local/bin/review"));
        assert_eq!(toml.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut toml = BunnifyToml::default();
        let err = toml
            .apply_env(env(&[("BUNNIFY_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("BUNNIFY_PORT"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut toml = BunnifyToml::default();
        toml.apply_env(env(&[("BUNNIFY_PORT", "9100")])).unwrap();
        BunnifyConfig::apply_cli(
            &mut toml,
            &CliOverrides {
                port: Some(9200),
                bookmarks: Some(PathBuf::from("other.json")),
                ..Default::default()
            },
        );
        assert_eq!(toml.server.port, 9200);
        assert_eq!(toml.bookmarks.file, PathBuf::from("other.json"));
        assert!(!toml.server.dev_mode);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut toml = BunnifyToml::default();
        toml.review.default_repo = "acme/widgets".into();
        toml.review.phases = PhaseTable::default().rules().to_vec();
        toml.save(&path).unwrap();

        let loaded = BunnifyToml::load(&path).unwrap();
        assert_eq!(loaded.review.default_repo, "acme/widgets");
        assert_eq!(loaded.review.phases.len(), 4);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let toml = BunnifyToml::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(toml.server.port, 8000);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = BunnifyConfig::load(Some(&missing), &CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_base_url() {
        let mut server = ServerSection::default();
        assert_eq!(server.base_url(), "http://127.0.0.1:8000");
        server.public_url = Some("https://go.example.com/".into());
        assert_eq!(server.base_url(), "https://go.example.com");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
