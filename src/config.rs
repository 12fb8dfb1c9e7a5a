//! TOML configuration parsing and validation.
//!
//! A single file describes the ledger database, chunking, embeddings, the
//! vector store and the bots whose RAG file sets feed named collections.
//! Bots may also live in a separate directory, one TOML file per bot.
//!
//! Relative paths are resolved against the directory holding the config
//! file. All validation happens here, before anything touches the ledger.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub bots_dir: Option<PathBuf>,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_vector_path")]
    pub path: PathBuf,
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_vector_path() -> PathBuf {
    PathBuf::from("data/vector/vectors.sqlite")
}

/// A bot and, optionally, the documents it retrieves from.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    #[serde(default)]
    pub rag: Option<RagConfig>,
}

impl BotConfig {
    /// RAG settings when ingestion is enabled for this bot.
    pub fn active_rag(&self) -> Option<&RagConfig> {
        self.rag.as_ref().filter(|rag| rag.enabled)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Target vector collection.
    pub collection: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub files: Vec<FileGlob>,
}

fn default_enabled() -> bool {
    true
}

/// A directory plus a glob evaluated relative to it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileGlob {
    pub dir: PathBuf,
    pub glob: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = std::path::absolute(&base).unwrap_or(base);

    config.db.path = resolve(&base, &config.db.path);
    config.vector_store.path = resolve(&base, &config.vector_store.path);

    if let Some(dir) = config.bots_dir.take() {
        let dir = resolve(&base, &dir);
        let mut loaded = load_bots_dir(&dir)?;
        config.bots.append(&mut loaded);
        config.bots_dir = Some(dir);
    }

    for bot in &mut config.bots {
        if let Some(rag) = bot.rag.as_mut() {
            for fg in &mut rag.files {
                fg.dir = resolve(&base, &fg.dir);
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

/// Load one bot per `*.toml` file, in file-name order.
fn load_bots_dir(dir: &Path) -> Result<Vec<BotConfig>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read bots_dir: {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    let mut bots = Vec::with_capacity(files.len());
    for file in files {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read bot config: {}", file.display()))?;
        let bot: BotConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse bot config: {}", file.display()))?;
        bots.push(bot);
    }
    Ok(bots)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Make `path` absolute against the working directory, in the same form
/// the ledger stores source paths.
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    Ok(normalize(&std::path::absolute(path)?))
}

/// `.` and `..` removed lexically. Symlinks are not followed, so ledger
/// paths stay the paths the user configured.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    match config.vector_store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown vector_store.backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    let mut names = HashSet::new();
    for bot in &config.bots {
        if bot.name.trim().is_empty() {
            bail!("bot name must not be empty");
        }
        if !names.insert(bot.name.as_str()) {
            bail!("duplicate bot name: '{}'", bot.name);
        }
        let Some(rag) = bot.active_rag() else {
            continue;
        };
        if rag.collection.trim().is_empty() || rag.collection.contains(char::is_whitespace) {
            bail!(
                "bot '{}': rag.collection must be a non-empty name without whitespace",
                bot.name
            );
        }
        if rag.files.is_empty() {
            bail!("bot '{}': rag.files must list at least one glob", bot.name);
        }
        for fg in &rag.files {
            Glob::new(&fg.glob)
                .with_context(|| format!("bot '{}': invalid glob '{}'", bot.name, fg.glob))?;
        }
    }

    Ok(())
}
