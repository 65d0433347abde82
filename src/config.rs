//! 应用配置模块
//!
//! 所有配置保存在同一个 config.json 中，按顶层键分段独立读写。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.json";

/// 读取整个配置文件，不存在或损坏时返回空对象
fn read_root(config_dir: &Path) -> serde_json::Value {
    fs::read_to_string(config_dir.join(CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .filter(|v| v.is_object())
        .unwrap_or_else(|| serde_json::json!({}))
}

/// 读取一个配置段，缺失或格式错误时使用默认值
pub fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, key: &str) -> T {
    read_root(config_dir)
        .get(key)
        .and_then(|section| serde_json::from_value::<T>(section.clone()).ok())
        .unwrap_or_default()
}

/// 写入一个配置段，保留其他段
pub fn save_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let mut root = read_root(config_dir);
    root[key] = serde_json::to_value(value).map_err(io::Error::other)?;
    let content = serde_json::to_string_pretty(&root).map_err(io::Error::other)?;
    fs::write(config_dir.join(CONFIG_FILE), content)
}

/// 远程存储连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub user_agent: String,
    /// 列表、创建等操作的超时（秒）
    pub request_timeout_secs: u64,
    /// 文件内容下载的超时（秒）
    pub transfer_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            user_agent: format!("gitshelf/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: crate::remote::OP_TIMEOUT_SECS,
            transfer_timeout_secs: crate::remote::IO_TIMEOUT_SECS,
        }
    }
}

/// 传输配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferConfig {
    /// 下载最大并发数，1 表示严格顺序执行
    pub max_concurrent_downloads: usize,
}

pub const MAX_CONCURRENT_DOWNLOADS: usize = 16;

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 1,
        }
    }
}

impl TransferConfig {
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS)
    }
}

/// 缓存配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// 列表快照视为过期的时长（秒），0 表示不按时间过期
    pub listing_ttl_secs: u64,
}

/// 汇总配置
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub transfer: TransferConfig,
    pub cache: CacheConfig,
    /// 上次使用的目录（由展示层保存）
    pub last_directory: Option<String>,
}

impl AppConfig {
    pub fn load(config_dir: &Path) -> Self {
        Self {
            remote: load_section(config_dir, "remote"),
            transfer: load_section(config_dir, "transfer"),
            cache: load_section(config_dir, "cache"),
            last_directory: load_section(config_dir, "lastDirectory"),
        }
    }

    pub fn save_last_directory(config_dir: &Path, directory: &str) -> io::Result<()> {
        save_section(config_dir, "lastDirectory", &directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(tmp.path());
        assert_eq!(config.remote.api_base_url, "https://api.github.com");
        assert_eq!(config.transfer.concurrency(), 1);
        assert_eq!(config.cache.listing_ttl_secs, 0);
        assert!(config.last_directory.is_none());
    }

    #[test]
    fn test_partial_section_and_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"{"transfer": {"maxConcurrentDownloads": 64}, "remote": {"apiBaseUrl": "http://ghe.local/api/v3"}}"#,
        )
        .unwrap();
        let config = AppConfig::load(tmp.path());
        assert_eq!(config.transfer.concurrency(), MAX_CONCURRENT_DOWNLOADS);
        assert_eq!(config.remote.api_base_url, "http://ghe.local/api/v3");
        assert_eq!(config.remote.request_timeout_secs, 60);

        fs::write(tmp.path().join(CONFIG_FILE), "{not json").unwrap();
        let config = AppConfig::load(tmp.path());
        assert_eq!(config.transfer.concurrency(), 1);
    }

    #[test]
    fn test_save_section_preserves_others() {
        let tmp = TempDir::new().unwrap();
        save_section(tmp.path(), "cache", &CacheConfig { listing_ttl_secs: 30 }).unwrap();
        AppConfig::save_last_directory(tmp.path(), "dotfiles").unwrap();

        let config = AppConfig::load(tmp.path());
        assert_eq!(config.cache.listing_ttl_secs, 30);
        assert_eq!(config.last_directory.as_deref(), Some("dotfiles"));
    }
}
