use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible chat completions endpoint.
    #[default]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: Provider,
    /// Empty means the provider's public endpoint.
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_code_language")]
    pub code_language: String,
    /// Replaces the built-in system prompt when non-empty.
    #[serde(default)]
    pub custom_prompt: String,
    /// Capture program and arguments; `{path}` is replaced by the output file.
    #[serde(default = "default_capture_command")]
    pub capture_command: Vec<String>,
}

fn default_code_language() -> String {
    "typescript".to_string()
}

fn default_capture_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["screencapture", "-x", "-t", "png", "{path}"]
    } else {
        &["grim", "{path}"]
    };
    argv.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            code_language: default_code_language(),
            custom_prompt: String::new(),
            capture_command: default_capture_command(),
        }
    }
}

impl Config {
    /// Default location: `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "snapsolve", "snapsolve")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
