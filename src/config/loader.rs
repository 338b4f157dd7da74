//! Configuration File Loading
//!
//! Handles loading and saving configuration files from various locations
//! with support for multiple formats and fallback mechanisms.

use super::Config;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "SKETCHCC_CONFIG";

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files (without extension)
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether to fall back to the default config if none exists
    pub create_default: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::load_with_options(LoadOptions::default())
    }

    /// Load configuration with custom options
    pub fn load_with_options(options: LoadOptions) -> Result<Config> {
        let mut loader = Self::new();

        if let Ok(explicit) = env::var(CONFIG_ENV_VAR) {
            let config = loader.load_from_path(Path::new(&explicit))?;
            if options.validate {
                loader.validate_config(&config)?;
            }
            return Ok(config);
        }

        loader.load_from_search_paths(&options)
    }

    /// Load from this loader's search paths
    pub fn load_from_search_paths(&mut self, options: &LoadOptions) -> Result<Config> {
        if let Some((path, config)) = self.find_and_load_config()? {
            debug!("Loaded configuration from {}", path.display());
            self.current_path = Some(path);

            if options.validate {
                self.validate_config(&config)?;
            }

            return Ok(config);
        }

        if options.create_default {
            let config = Config::default();
            if options.validate {
                self.validate_config(&config)?;
            }
            Ok(config)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Load a configuration file whose format is inferred from its extension
    pub fn load_from_path(&mut self, path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }

        let format = super::utils::get_config_format(path).unwrap_or(ConfigFormat::Toml);
        let config = self.load_config_file(path, format)?;
        self.current_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: "JSON".to_string(),
                    reason: e.to_string(),
                }
            })?,
            _ => toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                format: "TOML".to_string(),
                reason: e.to_string(),
            })?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for path in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = self.get_config_path_for_format(path, *format);

                if config_path.exists() {
                    match self.load_config_file(&config_path, *format) {
                        Ok(config) => return Ok(Some((config_path, config))),
                        Err(e) => {
                            warn!(
                                "Failed to load config from {}: {}",
                                config_path.display(),
                                e
                            );
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Load a specific configuration file
    fn load_config_file(&self, path: &Path, format: ConfigFormat) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: "TOML".to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: "JSON".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Get configuration file path for a specific format
    fn get_config_path_for_format(&self, base_path: &Path, format: ConfigFormat) -> PathBuf {
        let extension = match format {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        };

        base_path.join("config").with_extension(extension)
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("sketchcc"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sketchcc"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("sketchcc"));
            paths.push(home.join(".sketchcc"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join(".sketchcc"));
        }

        paths.dedup();
        paths
    }

    /// Validate configuration
    pub fn validate_config(&self, config: &Config) -> Result<()> {
        let session = &config.session;

        if session.command_timeout_ms == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "session.command_timeout_ms".to_string(),
                reason: "Command timeout must be greater than 0".to_string(),
            });
        }

        if session.boot_timeout_ms == Some(0) {
            return Err(Error::ConfigValidationFailed {
                field: "session.boot_timeout_ms".to_string(),
                reason: "Boot timeout must be greater than 0 when set".to_string(),
            });
        }

        for (field, value) in [
            ("session.sentinel_command", &session.sentinel_command),
            ("session.sentinel_echo", &session.sentinel_echo),
            ("session.ready_prompt", &session.ready_prompt),
            ("session.work_prompt", &session.work_prompt),
            ("pipeline.work_dir", &config.pipeline.work_dir),
            ("pipeline.default_device", &config.pipeline.default_device),
            ("pipeline.default_clock_rate", &config.pipeline.default_clock_rate),
        ] {
            if value.trim().is_empty() {
                return Err(Error::ConfigValidationFailed {
                    field: field.to_string(),
                    reason: "Value cannot be empty".to_string(),
                });
            }
        }

        if session.sentinel_command.contains('\n') {
            return Err(Error::ConfigValidationFailed {
                field: "session.sentinel_command".to_string(),
                reason: "Sentinel command must be a single line".to_string(),
            });
        }

        if session.diagnostic_anchor_len == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "session.diagnostic_anchor_len".to_string(),
                reason: "Anchor length must be greater than 0".to_string(),
            });
        }

        if config.sandbox.shell_path.as_os_str().is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "sandbox.shell_path".to_string(),
                reason: "Shell path cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
