//! Configuration and path resolution for the CLI.
//!
//! - Data directory: `--data-dir`, otherwise the platform data directory
//! - Config file: `--config`, otherwise `scriptorium.toml` in the platform
//!   config directory if it exists, otherwise defaults

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use scriptorium_core::config::EngineConfig;
use scriptorium_core::text::Language;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Database file name
const DATABASE_FILENAME: &str = "corpus.redb";

/// Config file name looked up in the platform config directory
const CONFIG_FILENAME: &str = "scriptorium.toml";

/// A lemma table to load at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LemmaTableConfig {
    pub language: Language,
    /// TSV file: `surface<TAB>lemma[<TAB>morphology]`
    pub path: PathBuf,
}

/// Contents of `scriptorium.toml`.
///
/// ```toml
/// lexicon = "/data/lsj.json"
/// grammar = "/data/smyth.json"
///
/// [[lemma_tables]]
/// language = "greek"
/// path = "/data/greek-lemmata.tsv"
///
/// [engine]
/// lemmatizer_timeout_ms = 500
///
/// [engine.fusion]
/// lemma_weight = 3.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,
    /// JSON array of lexicon entries
    pub lexicon: Option<PathBuf>,
    /// JSON array of grammar references
    pub grammar: Option<PathBuf>,
    pub lemma_tables: Vec<LemmaTableConfig>,
}

impl CliConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(content).context("Invalid configuration file")?;
        config
            .engine
            .validate()
            .context("Invalid engine configuration")?;
        Ok(config)
    }

    /// Loads the config file. An explicit path must exist; the default path
    /// is optional.
    pub fn load(explicit: Option<&PathBuf>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.clone(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("In {}", path.display()))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "scriptorium", "Scriptorium")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Returns the data directory.
///
/// - macOS: `~/Library/Application Support/org.scriptorium.Scriptorium/`
/// - Linux: `~/.local/share/scriptorium/`
/// - Windows: `%APPDATA%\scriptorium\Scriptorium\data\`
pub fn get_data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Returns the path to the database file, creating its directory.
pub fn database_path(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let data_dir = get_data_dir(custom_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join(DATABASE_FILENAME))
}

/// Reads a reference file named in the config.
pub fn read_reference(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read reference file: {}", path.display()))
}
