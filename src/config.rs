//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della libreria e della CLI.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri dei profili di ottimizzazione
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `tools_dir`: Directory dei tool bundled (default: None = `IMG_TOOLS_DIR` o PATH)
//! - `pump_timeout_ms`: Attesa massima per ogni pump stdin/stdout (default: 60000)
//! - `jpeg_max_memory`: Valore passato a `-maxmemory` (default: "100M")
//! - `png_level`: Livello optipng `-oN` (0-7, default: 7)
//! - `default_quality`: Qualità JPEG per `encode` (0-100, default: 80)
//! - `workers`: Numero di worker paralleli per la modalità batch (default: 4)
//! - `json_output`: Output JSON per uso programmatico (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     pump_timeout_ms: 5_000,
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the optimizer profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding bundled optimizer executables
    pub tools_dir: Option<PathBuf>,
    /// Bounded join for each stream pump, in milliseconds
    pub pump_timeout_ms: u64,
    /// Working memory cap handed to jpegtran/cjpeg
    pub jpeg_max_memory: String,
    /// optipng optimization level (0-7)
    pub png_level: u8,
    /// Quality used by `encode` when none is given (0-100)
    pub default_quality: u8,
    /// Number of parallel workers in batch mode
    pub workers: usize,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools_dir: None,
            pump_timeout_ms: 60_000,
            jpeg_max_memory: "100M".to_string(),
            png_level: 7,
            default_quality: 80,
            workers: 4,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.pump_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Pump timeout must be greater than 0"));
        }

        if self.png_level > 7 {
            return Err(anyhow::anyhow!("PNG optimization level must be between 0 and 7"));
        }

        if self.default_quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be between 0 and 100"));
        }

        if self.jpeg_max_memory.trim().is_empty() {
            return Err(anyhow::anyhow!("JPEG max memory must not be empty"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if let Some(ref tools_dir) = self.tools_dir {
            if !tools_dir.is_dir() {
                return Err(anyhow::anyhow!("Tools directory does not exist: {}", tools_dir.display()));
            }
        }

        Ok(())
    }

    /// Bounded wait applied to each pump join
    pub fn pump_timeout(&self) -> Duration {
        Duration::from_millis(self.pump_timeout_ms)
    }

    /// Default location of the config file (`<config_dir>/img-tools/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("img-tools").join("config.json"))
    }

    /// Load configuration from file, falling back to defaults when it is absent
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.png_level = 8;
        assert!(config.validate().is_err());

        config.png_level = 7;
        config.default_quality = 101;
        assert!(config.validate().is_err());

        config.default_quality = 80;
        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 4;
        config.pump_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.pump_timeout_ms = 60_000;
        config.tools_dir = Some(PathBuf::from("/definitely/not/a/real/tools/dir"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pump_timeout_default() {
        assert_eq!(Config::default().pump_timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let config = Config {
            png_level: 5,
            default_quality: 90,
            workers: 2,
            ..Default::default()
        };

        config.save_to_file(&config_path).await.unwrap();
        let loaded = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded.png_level, 5);
        assert_eq!(loaded.default_quality, 90);
        assert_eq!(loaded.workers, 2);
        assert_eq!(loaded.jpeg_max_memory, "100M");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(loaded.workers, Config::default().workers);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults_for_missing_keys() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "workers": 3 }"#).await.unwrap();

        let loaded = Config::from_file(&config_path).await.unwrap();
        assert_eq!(loaded.workers, 3);
        assert_eq!(loaded.pump_timeout_ms, 60_000);
    }
}
