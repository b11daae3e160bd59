use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::index::DEFAULT_INDEX_CAPACITY;
use crate::query::{EngineSettings, RequestLimits, DEFAULT_RESULT_CAPACITY};

/// 配置文件（toml），所有段都可省略
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 6070,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub assets: PathBuf,
    pub materials: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facet-query");
        Self {
            assets: base.join("assets.json"),
            materials: base.join("materials.json"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub index_capacity: usize,
    pub result_capacity: usize,
    pub result_ttl_secs: u64,
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_capacity: DEFAULT_INDEX_CAPACITY,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            result_ttl_secs: 30,
            coalesce_misses: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// material 请求未指定 projects 时使用的项目
    pub default_project: String,
    pub max_limit: usize,
    pub max_keyword_len: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let limits = RequestLimits::default();
        Self {
            default_project: "default".into(),
            max_limit: limits.max_limit,
            max_keyword_len: limits.max_keyword_len,
        }
    }
}

impl Config {
    /// 查找顺序：显式路径 → `<config_dir>/facet-query/config.toml` → 内置默认值
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("facet-query").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let cfg = Self::from_toml(&text).with_context(|| format!("parsing config {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn base_settings(&self) -> EngineSettings {
        EngineSettings {
            index_capacity: self.cache.index_capacity,
            result_capacity: self.cache.result_capacity,
            result_ttl: Duration::from_secs(self.cache.result_ttl_secs),
            coalesce_misses: self.cache.coalesce_misses,
            limits: RequestLimits {
                max_limit: self.query.max_limit,
                max_keyword_len: self.query.max_keyword_len,
            },
            defaults: Vec::new(),
        }
    }

    pub fn asset_settings(&self) -> EngineSettings {
        self.base_settings()
    }

    pub fn material_settings(&self) -> EngineSettings {
        self.base_settings()
            .with_default("project", self.query.default_project.clone())
    }
}
