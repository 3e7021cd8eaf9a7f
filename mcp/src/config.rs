//! Configuration loading for mcp-jellyseerr.
//!
//! Configuration is resolved from three fallback sources (tried in order):
//!
//! 1. **JSON file** via `--config <path>` CLI flag
//! 2. **JSON file** via `JELLYSEERR_CONFIG` environment variable
//! 3. **Environment variables**: `JELLYSEERR_URL` + `JELLYSEERR_API_KEY`,
//!    plus optional `JELLYSEERR_TIMEOUT`, `MCP_TRANSPORT` and `LOG_LEVEL`
//!
//! The JSON file looks like:
//!
//! ```json
//! {
//!   "url": "http://jellyseerr.local:5055",
//!   "api_key": "...",
//!   "timeout_secs": 30,
//!   "log_level": "info",
//!   "services": { "movie": "radarr", "tv": "sonarr", "uhd_suffix": "_4k" }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use reqwest::Url;
use serde::Deserialize;

use crate::resolver::ServicePolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRANSPORT: &str = "stdio";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Transports this binary can serve.
const SUPPORTED_TRANSPORTS: &[&str] = &["stdio"];

/// CLI arguments parsed by `clap`.
#[derive(Parser)]
#[command(name = "mcp-jellyseerr", about = "MCP server for Jellyseerr", version)]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Raw JSON config file structure.
#[derive(Deserialize)]
struct ConfigFile {
    url: String,
    api_key: String,
    timeout_secs: Option<u64>,
    transport: Option<String>,
    log_level: Option<String>,
    #[serde(default)]
    services: ServicePolicy,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Jellyseerr base URL, without the `/api/v1` suffix.
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub transport: String,
    pub log_level: String,
    pub services: ServicePolicy,
}

/// Load and validate configuration from CLI args, env vars, or config file.
pub fn load_config(cli: &Cli) -> Result<ResolvedConfig, String> {
    load_config_with(cli, |key| std::env::var(key).ok())
}

fn load_config_with(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, String> {
    if let Some(path) = &cli.config {
        load_from_file(&expand_tilde(path, &env))
    } else if let Some(path) = env("JELLYSEERR_CONFIG") {
        load_from_file(&expand_tilde(Path::new(&path), &env))
    } else {
        load_from_env(env)
    }
}

/// Expand a leading `~` to `$HOME`.
fn expand_tilde(path: &Path, env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = env("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn load_from_file(path: &Path) -> Result<ResolvedConfig, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

    let file: ConfigFile = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

    validate(ResolvedConfig {
        url: file.url,
        api_key: file.api_key,
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        transport: file.transport.unwrap_or_else(|| DEFAULT_TRANSPORT.into()),
        log_level: file.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
        services: file.services,
    })
}

fn load_from_env(env: impl Fn(&str) -> Option<String>) -> Result<ResolvedConfig, String> {
    let url = env("JELLYSEERR_URL").ok_or("No config file and JELLYSEERR_URL not set")?;
    let api_key =
        env("JELLYSEERR_API_KEY").ok_or("No config file and JELLYSEERR_API_KEY not set")?;

    let timeout_secs = match env("JELLYSEERR_TIMEOUT") {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            format!("JELLYSEERR_TIMEOUT must be a whole number of seconds, got '{raw}'")
        })?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    validate(ResolvedConfig {
        url,
        api_key,
        timeout: Duration::from_secs(timeout_secs),
        transport: env("MCP_TRANSPORT").unwrap_or_else(|| DEFAULT_TRANSPORT.into()),
        log_level: env("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
        services: ServicePolicy::default(),
    })
}

fn validate(mut config: ResolvedConfig) -> Result<ResolvedConfig, String> {
    config.url = config.url.trim().trim_end_matches('/').to_string();
    if config.url.is_empty() {
        return Err("Jellyseerr url is empty".into());
    }
    match Url::parse(&config.url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        Ok(u) => {
            return Err(format!(
                "Jellyseerr url must be http or https, got scheme '{}'",
                u.scheme()
            ))
        }
        Err(e) => return Err(format!("Invalid Jellyseerr url '{}': {}", config.url, e)),
    }

    if config.api_key.trim().is_empty() {
        return Err("Jellyseerr api_key is empty".into());
    }
    if config.timeout.is_zero() {
        return Err("timeout must be greater than zero".into());
    }

    config.transport = config.transport.trim().to_ascii_lowercase();
    if !SUPPORTED_TRANSPORTS.contains(&config.transport.as_str()) {
        return Err(format!(
            "Unsupported transport '{}'. Supported: {}",
            config.transport,
            SUPPORTED_TRANSPORTS.join(", ")
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn no_cli() -> Cli {
        Cli { config: None }
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mcp-jellyseerr-{}-{}.json",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn env_config_with_defaults() {
        let env = env_of(&[
            ("JELLYSEERR_URL", "http://jelly:5055/"),
            ("JELLYSEERR_API_KEY", "abc"),
        ]);
        let c = load_config_with(&no_cli(), env).unwrap();
        assert_eq!(c.url, "http://jelly:5055");
        assert_eq!(c.api_key, "abc");
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.transport, "stdio");
        assert_eq!(c.log_level, "info");
        assert_eq!(c.services, ServicePolicy::default());
    }

    #[test]
    fn env_config_requires_url() {
        let err = load_config_with(&no_cli(), env_of(&[("JELLYSEERR_API_KEY", "abc")]))
            .unwrap_err();
        assert!(err.contains("JELLYSEERR_URL"));
    }

    #[test]
    fn env_config_rejects_empty_key() {
        let env = env_of(&[("JELLYSEERR_URL", "http://x"), ("JELLYSEERR_API_KEY", " ")]);
        assert!(load_config_with(&no_cli(), env)
            .unwrap_err()
            .contains("api_key"));
    }

    #[test]
    fn env_config_rejects_bad_timeout() {
        let env = env_of(&[
            ("JELLYSEERR_URL", "http://x"),
            ("JELLYSEERR_API_KEY", "k"),
            ("JELLYSEERR_TIMEOUT", "soon"),
        ]);
        assert!(load_config_with(&no_cli(), env)
            .unwrap_err()
            .contains("JELLYSEERR_TIMEOUT"));
    }

    #[test]
    fn network_transport_is_rejected() {
        let env = env_of(&[
            ("JELLYSEERR_URL", "http://x"),
            ("JELLYSEERR_API_KEY", "k"),
            ("MCP_TRANSPORT", "sse"),
        ]);
        assert!(load_config_with(&no_cli(), env)
            .unwrap_err()
            .contains("Unsupported transport 'sse'"));
    }

    #[test]
    fn non_http_url_is_rejected() {
        let env = env_of(&[("JELLYSEERR_URL", "ftp://x"), ("JELLYSEERR_API_KEY", "k")]);
        assert!(load_config_with(&no_cli(), env).unwrap_err().contains("ftp"));
    }

    #[test]
    fn file_config_with_service_policy() {
        let path = temp_file(
            "policy",
            r#"{
                "url": "https://requests.example.com",
                "api_key": "k",
                "timeout_secs": 5,
                "services": { "movie": "radarr-main" }
            }"#,
        );
        let cli = Cli {
            config: Some(path.clone()),
        };
        let c = load_config_with(&cli, env_of(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(c.timeout, Duration::from_secs(5));
        assert_eq!(c.services.movie, "radarr-main");
        assert_eq!(c.services.tv, "sonarr");
        assert_eq!(c.services.uhd_suffix, "_4k");
    }

    #[test]
    fn file_from_env_var_takes_precedence_over_url_vars() {
        let path = temp_file("envpath", r#"{ "url": "http://from-file", "api_key": "k" }"#);
        let env_path = path.to_string_lossy().to_string();
        let env = env_of(&[
            ("JELLYSEERR_CONFIG", env_path.as_str()),
            ("JELLYSEERR_URL", "http://from-env"),
            ("JELLYSEERR_API_KEY", "k"),
        ]);
        let c = load_config_with(&no_cli(), env).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.url, "http://from-file");
    }

    #[test]
    fn zero_timeout_in_file_is_rejected() {
        let path = temp_file(
            "zero",
            r#"{ "url": "http://x", "api_key": "k", "timeout_secs": 0 }"#,
        );
        let cli = Cli {
            config: Some(path.clone()),
        };
        let err = load_config_with(&cli, env_of(&[])).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.contains("timeout"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let env = env_of(&[("HOME", "/home/me")]);
        assert_eq!(
            expand_tilde(Path::new("~/jelly.json"), &env),
            PathBuf::from("/home/me/jelly.json")
        );
        assert_eq!(
            expand_tilde(Path::new("/etc/jelly.json"), &env),
            PathBuf::from("/etc/jelly.json")
        );
    }
}
