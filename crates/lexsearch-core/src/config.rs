//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_BM25__K1=1.2`). Provides helpers to expand `~` and `${VAR}` and to
//! resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load with config files looked up in `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()).into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub index: IndexSettings,
    pub bm25: Bm25Settings,
    pub retrieval: RetrievalSettings,
    pub embed: EmbedSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bm25.k1.is_nan() || self.bm25.k1 < 0.0 {
            return Err(Error::InvalidConfig(format!("bm25.k1 must be >= 0, got {}", self.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::InvalidConfig(format!("bm25.b must be within [0, 1], got {}", self.bm25.b)));
        }
        if self.retrieval.top_k_semantic == 0 || self.retrieval.top_k_final == 0 {
            return Err(Error::InvalidConfig("retrieval top-k values must be positive".into()));
        }
        if self.embed.batch_size == 0 {
            return Err(Error::InvalidConfig("embed.batch_size must be positive".into()));
        }
        if self.embed.use_fake && self.embed.fake_dim == 0 {
            return Err(Error::InvalidConfig("embed.fake_dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub dir: String,
}

impl Default for CorpusSettings {
    fn default() -> Self { Self { dir: "./legal resources/json_files".to_string() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dir: String,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { dir: "./indexes".to_string() } }
}

/// Which population the rerank's idf is computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdfScope {
    /// Full-corpus statistics computed at build time.
    #[default]
    Corpus,
    /// df and N recomputed over the candidate subset of each query.
    Candidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f64,
    pub b: f64,
    pub idf_scope: IdfScope,
}

impl Default for Bm25Settings {
    fn default() -> Self { Self { k1: 1.5, b: 0.75, idf_scope: IdfScope::Corpus } }
}

/// What the retriever does with a semantic hit that has no lexical entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyPolicy {
    #[default]
    Fail,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_semantic: usize,
    pub top_k_final: usize,
    pub on_inconsistency: ConsistencyPolicy,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k_semantic: 5, top_k_final: 3, on_inconsistency: ConsistencyPolicy::Fail } }
}

/// Compute device requested for the BERT embedder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Metal when the crate was built with it and a device opens, else CPU.
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "mps")]
    Metal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    /// Directory holding `config.json`, `tokenizer.json` and the weights.
    pub model_dir: Option<String>,
    pub model_name: String,
    pub use_fake: bool,
    pub fake_dim: usize,
    pub max_len: usize,
    pub batch_size: usize,
    /// Per-query deadline applied by the CLI; `0` disables it.
    pub deadline_secs: u64,
    pub device: DevicePreference,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            model_name: "all-MiniLM-L12-v2".to_string(),
            use_fake: false,
            fake_dim: 384,
            max_len: 256,
            batch_size: 32,
            deadline_secs: 30,
            device: DevicePreference::Auto,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
