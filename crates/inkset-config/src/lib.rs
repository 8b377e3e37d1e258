//! Configuration management for inkset.
//!
//! Parses `inkset.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `diagrams.font_css_url`
//! - `renderer.command`
//! - `cache.dir`
//!
//! ## Hashing
//!
//! [`DiagramsConfig`] is the "active configuration" that participates in every
//! diagram's content hash. It is [`Serialize`] so that the hash covers every
//! recognized field, including the opaque `renderer_options` table.

mod expand;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Override the `every_page` flag.
    pub every_page: Option<bool>,
    /// Override the default diagram scale.
    pub scale: Option<f64>,
    /// Override the renderer command line.
    pub renderer_command: Option<Vec<String>>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "inkset.toml";

/// Default font stylesheet shipped with the `TikZ` renderer.
pub const DEFAULT_FONT_CSS_URL: &str =
    "https://cdn.jsdelivr.net/npm/node-tikzjax@latest/css/fonts.css";

/// Default scale applied to blocks carrying a bare `-scale` modifier.
pub const DEFAULT_SCALE: f64 = 1.5;

/// Default fence tag for diagram blocks.
pub const DEFAULT_TAG: &str = "tikz";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Diagram processing options (hashed into every cache key).
    pub diagrams: DiagramsConfig,
    /// External renderer invocation.
    pub renderer: RendererConfig,
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Diagram processing configuration.
///
/// Field order is part of the content hash; append new fields at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramsConfig {
    /// Fence tag selecting the diagram dialect (e.g. `tikz`).
    pub tag: String,
    /// Process every page, even those that did not opt in.
    pub every_page: bool,
    /// Stylesheet linked into the head of pages with diagrams.
    pub font_css_url: String,
    /// Extra CSS injected as an inline `<style>` block (empty to skip).
    pub inline_style: String,
    /// Scale used by blocks with a bare `-scale` modifier.
    pub scale: f64,
    /// Opaque options forwarded to the renderer.
    pub renderer_options: toml::Table,
}

impl Default for DiagramsConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_owned(),
            every_page: false,
            font_css_url: DEFAULT_FONT_CSS_URL.to_owned(),
            inline_style: String::new(),
            scale: DEFAULT_SCALE,
            renderer_options: toml::Table::new(),
        }
    }
}

/// External renderer configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Program and arguments; diagram source is written to its stdin.
    pub command: Vec<String>,
}

/// Raw cache configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    dir: Option<String>,
}

/// Resolved cache configuration with absolute paths.
#[derive(Debug, Default)]
pub struct CacheConfig {
    /// Cache root directory.
    pub dir: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`cache.dir`").
        field: String,
        /// Error message (e.g., "${`CACHE_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `inkset.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, and the
    /// result is validated again so overrides cannot sneak in bad values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(cache_dir) = &settings.cache_dir {
            self.cache_resolved.dir.clone_from(cache_dir);
        }
        if let Some(every_page) = settings.every_page {
            self.diagrams.every_page = every_page;
        }
        if let Some(scale) = settings.scale {
            self.diagrams.scale = scale;
        }
        if let Some(command) = &settings.renderer_command {
            self.renderer.command.clone_from(command);
        }
    }

    /// Get the renderer command line, requiring it to be configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if `renderer.command` is empty.
    pub fn require_renderer_command(&self) -> Result<&[String], ConfigError> {
        match self.renderer.command.first() {
            Some(program) if !program.is_empty() => Ok(&self.renderer.command),
            _ => Err(ConfigError::Validation(
                "renderer.command is required to render diagrams".to_owned(),
            )),
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            diagrams: DiagramsConfig::default(),
            renderer: RendererConfig::default(),
            cache: CacheConfigRaw::default(),
            cache_resolved: CacheConfig {
                dir: base.join(".inkset").join("cache"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_diagrams()?;
        Ok(())
    }

    /// Validate diagrams configuration.
    fn validate_diagrams(&self) -> Result<(), ConfigError> {
        const MAX_SCALE: f64 = 100.0;

        let diagrams = &self.diagrams;

        require_non_empty(&diagrams.tag, "diagrams.tag")?;
        if !diagrams
            .tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Validation(
                "diagrams.tag may only contain ASCII letters, digits and '_'".to_owned(),
            ));
        }

        require_non_empty(&diagrams.font_css_url, "diagrams.font_css_url")?;

        if !diagrams.scale.is_finite() || diagrams.scale <= 0.0 {
            return Err(ConfigError::Validation(
                "diagrams.scale must be a positive number".to_owned(),
            ));
        }
        if diagrams.scale > MAX_SCALE {
            return Err(ConfigError::Validation(format!(
                "diagrams.scale cannot exceed {MAX_SCALE}"
            )));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.diagrams.font_css_url =
            expand::expand_env(&self.diagrams.font_css_url, "diagrams.font_css_url")?;

        for arg in &mut self.renderer.command {
            *arg = expand::expand_env(arg, "renderer.command")?;
        }

        if let Some(ref dir) = self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.cache_resolved = CacheConfig {
            dir: self.cache.dir.as_deref().map_or_else(
                || config_dir.join(".inkset").join("cache"),
                |dir| config_dir.join(dir),
            ),
        };
    }
}
