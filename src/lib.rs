use std::path::PathBuf;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod remote;

pub use crate::core::{SessionContext, Snapshot, TransferReport};
pub use config::AppConfig;
pub use error::{AuthError, CoreError, FetchError, PreconditionError, WriteError};
pub use remote::{Entry, GitHubClient, LocalClient, RemoteContentClient, Session};

/// 应用数据目录：优先 GITSHELF_HOME，其次平台配置目录下的 gitshelf
pub fn app_dir() -> PathBuf {
    if let Some(custom) = std::env::var_os("GITSHELF_HOME") {
        return PathBuf::from(custom);
    }
    dirs::config_dir()
        .map(|p| p.join("gitshelf"))
        .unwrap_or_else(|| PathBuf::from(".gitshelf"))
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
