//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\line-forge\
//!   macOS:   ~/Library/Application Support/line-forge/
//!   Linux:   ~/.config/line-forge/
//!
//! Data dir (generated line sets):
//!   Windows: %LOCALAPPDATA%\line-forge\
//!   macOS:   ~/Library/Application Support/line-forge/
//!   Linux:   ~/.local/share/line-forge/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Default directory for generated output files.
    pub output_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "line-forge";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let output_dir = data_dir.join("lines");

        Self {
            config_dir,
            settings_file,
            output_dir,
        }
    }

    /// Default output file for `catalog`: `<output_dir>/<catalog stem>.json`.
    pub fn output_for(&self, catalog: &Path) -> PathBuf {
        let stem = catalog
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("lines");
        self.output_dir.join(format!("{stem}.json"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
