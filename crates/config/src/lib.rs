use std::path::{Path, PathBuf};
use serde::Deserialize;

/// All configuration for the padel booking server.
///
/// Precedence (lowest to highest): defaults → config file → env var → CLI arg.
/// CLI arg merging is done by the caller after `Config::load()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Database
    pub db_url: String,
    pub db_max_connections: u32,

    // Server
    pub port: u16,
    pub static_dir: String,

    // Logging
    pub log_level: String,
    pub utc: bool,
    pub log_json: bool,
}

/// Config file layout (~/.padel/config.toml). All fields optional; they layer
/// on top of compiled-in defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_url: Option<String>,
    db_max_connections: Option<u32>,
    port: Option<u16>,
    static_dir: Option<String>,
    log_level: Option<String>,
    utc: Option<bool>,
    log_json: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: "sqlite:padel.db".to_string(),
            db_max_connections: 5,
            port: 3000,
            static_dir: "client/dist".to_string(),
            log_level: "info".to_string(),
            utc: false,
            log_json: false,
        }
    }
}

impl Config {
    /// Config directory: ~/.padel/
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".padel")
    }

    /// Config file path: ~/.padel/config.toml
    pub fn file_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load config: defaults → config file → env vars.
    /// `file` overrides the default config file location.
    /// CLI args should be merged by the caller afterward.
    pub fn load(file: Option<&Path>) -> Self {
        let mut config = Self::default();

        // Layer 2: config file
        let path = file.map(Path::to_path_buf).unwrap_or_else(Self::file_path);
        // Logging is not up yet; report a bad file on stderr and keep going.
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match toml::from_str::<FileConfig>(&contents) {
                Ok(file) => config.apply_file(file),
                Err(e) => eprintln!("Ignoring {}: {e}", path.display()),
            }
        }

        // Layer 3: environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    // --- Private helpers ---

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_url { self.db_url = v; }
        if let Some(v) = file.db_max_connections { self.db_max_connections = v; }
        if let Some(v) = file.port { self.port = v; }
        if let Some(v) = file.static_dir { self.static_dir = v; }
        if let Some(v) = file.log_level { self.log_level = v; }
        if let Some(v) = file.utc { self.utc = v; }
        if let Some(v) = file.log_json { self.log_json = v; }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("PADEL_DB_URL") { self.db_url = v; }
        if let Some(v) = var("PADEL_DB_MAX_CONNECTIONS") {
            if let Ok(n) = v.parse() { self.db_max_connections = n; }
        }
        if let Some(v) = var("PADEL_PORT") {
            if let Ok(p) = v.parse() { self.port = p; }
        }
        if let Some(v) = var("PADEL_STATIC_DIR") { self.static_dir = v; }
        if let Some(v) = var("PADEL_LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = var("PADEL_UTC") { self.utc = truthy(&v); }
        if let Some(v) = var("PADEL_LOG_JSON") { self.log_json = truthy(&v); }
    }
}

fn truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}
