//! Engine configuration: an optional TOML file overlaid on sensible
//! defaults — a missing or malformed file is never fatal, it just means
//! every field falls back to its default.

use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_FILE_NAME: &str = "geo-engine.toml";
const DEFAULT_UNDO_DEPTH_CAP: usize = 256;
const DEFAULT_VIEWPORT_WIDTH: f64 = 800.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 600.0;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { width: DEFAULT_VIEWPORT_WIDTH, height: DEFAULT_VIEWPORT_HEIGHT }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SolveConfig {
    pub worker_threads: usize,
    pub undo_depth_cap: usize,
    pub industrial_precision: bool,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            undo_depth_cap: DEFAULT_UNDO_DEPTH_CAP,
            industrial_precision: false,
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub viewport: ViewportConfig,
    pub solve: SolveConfig,
    pub log: LogConfig,
}

/// The loaded configuration plus the raw text it came from, kept alongside
/// each other so a caller can re-serialize or diff against what was
/// actually on disk.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub raw: Option<String>,
    pub file: ConfigFile,
}

impl EngineConfig {
    /// Look for `geo-engine.toml` in the current working directory. Does not
    /// fall back to a platform config directory — a headless engine has no
    /// natural per-user config home, and pulling in a directories crate for
    /// a single lookup isn't worth the dependency.
    pub fn discover() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(Self::discover);
        let raw = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
        };
        let file = match toml::from_str(&raw) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "malformed config file, falling back to defaults");
                ConfigFile::default()
            }
        };
        Ok(Self { raw: Some(raw), file })
    }

    pub fn worker_threads(&self) -> usize {
        self.file.solve.worker_threads
    }

    pub fn undo_depth_cap(&self) -> usize {
        self.file.solve.undo_depth_cap
    }

    pub fn industrial_precision(&self) -> bool {
        self.file.solve.industrial_precision
    }

    pub fn default_viewport(&self) -> (f64, f64) {
        (self.file.viewport.width, self.file.viewport.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load_from(Some(PathBuf::from("/nonexistent/geo-engine.toml"))).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.default_viewport(), (DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "viewport = not valid toml {{{{").unwrap();
        let cfg = EngineConfig::load_from(Some(f.path().to_path_buf())).unwrap();
        assert_eq!(cfg.undo_depth_cap(), DEFAULT_UNDO_DEPTH_CAP);
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "[solve]\nundo_depth_cap = 16\n").unwrap();
        let cfg = EngineConfig::load_from(Some(f.path().to_path_buf())).unwrap();
        assert_eq!(cfg.undo_depth_cap(), 16);
        assert_eq!(cfg.default_viewport(), (DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT));
    }
}
