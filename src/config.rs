use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub transcript: Option<PathBuf>,
    #[serde(default)]
    pub list: ListConfigFile,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
    #[serde(default)]
    pub llm: LlmConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ListConfigFile {
    pub estimated_height: Option<u32>,
    pub overscan: Option<usize>,
    pub window_size: Option<usize>,
    pub fade_rows: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub scroll_step: Option<u32>,
    pub frame_budget_ms: Option<u64>,
    pub watch_interval_ms: Option<u64>,
    pub spinner_interval_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct LlmConfigFile {
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub api_key_env: Option<String>,
    pub thinking_budget: Option<i32>,
    pub include_thoughts: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub send_history: Option<bool>,
}

// ---------------------------------------------------------------------------
// Config — resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    /// `None` when neither the config file, the CLI nor the environment
    /// provide a location; callers then report an error.
    pub transcript: Option<PathBuf>,
    pub list: ListSettings,
    pub viewer: ViewerConfig,
    pub llm: LlmConfig,
}

pub struct ListSettings {
    pub estimated_height: u32,
    pub overscan: usize,
    pub window_size: usize,
    pub fade_rows: u32,
}

pub struct ViewerConfig {
    pub scroll_step: u32,
    pub frame_budget: Duration,
    pub watch_interval: Duration,
    pub spinner_interval: Duration,
}

#[derive(Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: String,
    pub api_key_env: String,
    pub thinking_budget: i32,
    pub include_thoughts: bool,
    pub timeout: Duration,
    pub send_history: bool,
}

/// CLI values that override the config file.
#[derive(Default, Clone)]
pub struct CliOverrides {
    pub transcript: Option<PathBuf>,
    pub model: Option<String>,
    pub estimated_height: Option<u32>,
    pub overscan: Option<usize>,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref v) = cli.transcript {
            debug!("config: CLI override transcript={}", v.display());
            self.transcript = Some(v.clone());
        }
        if let Some(ref v) = cli.model {
            debug!("config: CLI override model={v}");
            self.llm.model = Some(v.clone());
        }
        if let Some(v) = cli.estimated_height {
            debug!("config: CLI override estimated_height={v}");
            self.list.estimated_height = Some(v);
        }
        if let Some(v) = cli.overscan {
            debug!("config: CLI override overscan={v}");
            self.list.overscan = Some(v);
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let config = Config {
            transcript: self.transcript.or_else(crate::transcript::default_path),
            list: ListSettings {
                estimated_height: self.list.estimated_height.unwrap_or(6),
                overscan: self.list.overscan.unwrap_or(3),
                window_size: self.list.window_size.unwrap_or(20),
                fade_rows: self.list.fade_rows.unwrap_or(1),
            },
            viewer: ViewerConfig {
                scroll_step: self.viewer.scroll_step.unwrap_or(3),
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(32)),
                watch_interval: Duration::from_millis(
                    self.viewer.watch_interval_ms.unwrap_or(200),
                ),
                spinner_interval: Duration::from_millis(
                    self.viewer.spinner_interval_ms.unwrap_or(120),
                ),
            },
            llm: LlmConfig {
                model: self.llm.model.unwrap_or_else(|| "gemini-2.5-pro".into()),
                api_base: self
                    .llm
                    .api_base
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
                api_key_env: self.llm.api_key_env.unwrap_or_else(|| "GEMINI_API_KEY".into()),
                thinking_budget: self.llm.thinking_budget.unwrap_or(1024),
                include_thoughts: self.llm.include_thoughts.unwrap_or(true),
                timeout: Duration::from_secs(self.llm.timeout_secs.unwrap_or(120)),
                send_history: self.llm.send_history.unwrap_or(true),
            },
        };
        info!(
            "config: resolved transcript={:?}, estimated_height={}, overscan={}, \
             window_size={}, fade_rows={}, scroll_step={}, frame_budget={}ms, \
             watch_interval={}ms, model={}, thinking_budget={}, send_history={}",
            config.transcript,
            config.list.estimated_height,
            config.list.overscan,
            config.list.window_size,
            config.list.fade_rows,
            config.viewer.scroll_step,
            config.viewer.frame_budget.as_millis(),
            config.viewer.watch_interval.as_millis(),
            config.llm.model,
            config.llm.thinking_budget,
            config.llm.send_history,
        );
        config
    }
}

/// Resolve the XDG config path for chatview.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("chatview").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml() {
        let cfg: ConfigFile = toml::from_str("").unwrap();
        let resolved = cfg.resolve();
        assert_eq!(resolved.list.estimated_height, 6);
        assert_eq!(resolved.list.overscan, 3);
        assert_eq!(resolved.list.window_size, 20);
        assert_eq!(resolved.viewer.scroll_step, 3);
        assert_eq!(resolved.llm.model, "gemini-2.5-pro");
        assert_eq!(resolved.llm.api_key_env, "GEMINI_API_KEY");
        assert!(resolved.llm.include_thoughts);
    }

    #[test]
    fn partial_toml() {
        let text = r#"
            transcript = "/tmp/chat.json"
            [list]
            overscan = 0
            [llm]
            model = "gemini-2.5-flash"
            thinking_budget = 0
        "#;
        let cfg: ConfigFile = toml::from_str(text).unwrap();
        let resolved = cfg.resolve();
        assert_eq!(resolved.transcript, Some(PathBuf::from("/tmp/chat.json")));
        assert_eq!(resolved.list.overscan, 0);
        assert_eq!(resolved.llm.model, "gemini-2.5-flash");
        assert_eq!(resolved.llm.thinking_budget, 0);
        // Defaults for unspecified fields
        assert_eq!(resolved.list.estimated_height, 6);
        assert_eq!(resolved.viewer.frame_budget, Duration::from_millis(32));
    }

    #[test]
    fn invalid_toml() {
        let text = "this is not valid toml [[[";
        let result = toml::from_str::<ConfigFile>(text);
        assert!(result.is_err());
    }

    #[test]
    fn cli_overrides() {
        let mut cfg: ConfigFile = toml::from_str("[list]\nestimated_height = 8").unwrap();
        cfg.merge_cli(&CliOverrides {
            transcript: Some(PathBuf::from("/tmp/other.json")),
            model: Some("gemini-2.5-flash".into()),
            estimated_height: Some(4),
            overscan: None,
        });
        let resolved = cfg.resolve();
        assert_eq!(resolved.list.estimated_height, 4); // CLI wins
        assert_eq!(resolved.list.overscan, 3); // default (neither config nor CLI)
        assert_eq!(resolved.llm.model, "gemini-2.5-flash");
        assert_eq!(resolved.transcript, Some(PathBuf::from("/tmp/other.json")));
    }
}
