//! Configuration for fbscreen
//!
//! Loads configuration from TOML file at `~/.config/fbscreen/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use fbscreen_surface::MissingDevicePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable holding colon-separated device tokens
pub const ARGS_ENV: &str = "FBSCREEN_ARGS";
/// Environment variable that hides the cursor when set to `1`
pub const HIDE_CURSOR_ENV: &str = "FBSCREEN_HIDECURSOR";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceSection,
    pub startup: StartupConfig,
    pub demo: DemoConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("fbscreen");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Device tokens in precedence order: config file, `FBSCREEN_ARGS`,
    /// `FBSCREEN_HIDECURSOR`, then the command line. Later tokens win.
    pub fn device_tokens(
        &self,
        env_args: Option<&str>,
        hide_cursor: Option<&str>,
        cli: &[String],
    ) -> Vec<String> {
        let mut tokens = Vec::new();

        if self.device.missing_device == MissingDevicePolicy::Stdin {
            tokens.push("fbfallback=stdin".to_string());
        }
        tokens.extend(self.device.tokens.iter().cloned());

        if let Some(args) = env_args {
            tokens.extend(args.split(':').filter(|t| !t.is_empty()).map(str::to_string));
        }

        if hide_cursor == Some("1") {
            tokens.push("hidecursor".to_string());
        }

        tokens.extend(cli.iter().cloned());
        tokens
    }
}

/// Device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Tokens as accepted on the command line, e.g. `["fb=/dev/fb1", "size=800x600"]`
    pub tokens: Vec<String>,
    /// What to do when no device is found: "fail" or "stdin"
    pub missing_device: MissingDevicePolicy,
}

/// What to do when the surface cannot be brought up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Exit with an error
    #[default]
    Abort,
    /// Keep running without a display
    Headless,
}

/// Startup behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub on_failure: FailureMode,
}

/// Demo scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Milliseconds between frames
    pub frame_interval_ms: u64,
    /// Edge length of the moving tile in pixels
    pub tile_size: u32,
    /// Background color (hex: 0xRRGGBB)
    pub background: u32,
    /// Tile color (hex: 0xRRGGBB)
    pub foreground: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            tile_size: 64,
            background: 0x1e1e2e,
            foreground: 0x89b4fa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [device]
            tokens = ["fb=/dev/fb1", "size=800x600"]

            [startup]
            on_failure = "headless"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.tokens, vec!["fb=/dev/fb1", "size=800x600"]);
        assert_eq!(config.device.missing_device, MissingDevicePolicy::Fail);
        assert_eq!(config.startup.on_failure, FailureMode::Headless);
        assert_eq!(config.demo, DemoConfig::default());
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[device]\nmissing_device = \"stdin\"\n\n[demo]\ntile_size = 8\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.device.missing_device, MissingDevicePolicy::Stdin);
        assert_eq!(config.demo.tile_size, 8);

        fs::write(&path, "[device\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_token_precedence() {
        let mut config = Config::default();
        config.device.tokens = vec!["size=640x480".into()];
        config.device.missing_device = MissingDevicePolicy::Stdin;

        let cli = vec!["size=320x200".to_string()];
        let tokens = config.device_tokens(Some("fb=/dev/fb2::offset=10x10"), Some("1"), &cli);

        assert_eq!(
            tokens,
            vec![
                "fbfallback=stdin",
                "size=640x480",
                "fb=/dev/fb2",
                "offset=10x10",
                "hidecursor",
                "size=320x200",
            ]
        );
    }

    #[test]
    fn test_hide_cursor_needs_exact_one() {
        let tokens = Config::default().device_tokens(None, Some("yes"), &[]);
        assert!(tokens.is_empty());
    }
}
