pub mod github;
pub mod local;

use crate::error::{AuthError, FetchError, WriteError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use github::GitHubClient;
pub use local::LocalClient;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- 认证、列表、创建等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 文件内容下载
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 文件类型缺失时的占位值
pub const KIND_NOT_AVAILABLE: &str = "N/A";

/// 展示用日期格式
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 远程条目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
    Submodule,
}

impl From<&str> for EntryType {
    fn from(s: &str) -> Self {
        match s {
            "dir" => EntryType::Dir,
            "symlink" => EntryType::Symlink,
            "submodule" => EntryType::Submodule,
            _ => EntryType::File,
        }
    }
}

/// 单个远程文件的元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    pub entry_type: EntryType,
    /// 扩展名分类，无扩展名时为 "N/A"
    pub kind: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    /// 读取文件内容所需的定位符（如下载 URL）
    pub remote_ref: String,
    /// 供人浏览的地址（如网页 URL）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl Entry {
    pub fn new(
        name: impl Into<String>,
        entry_type: EntryType,
        size_bytes: u64,
        modified_at: DateTime<Utc>,
        remote_ref: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            kind: kind_of(&name),
            name,
            entry_type,
            size_bytes,
            modified_at,
            remote_ref: remote_ref.into(),
            web_url: None,
        }
    }

    pub fn with_web_url(mut self, url: impl Into<String>) -> Self {
        self.web_url = Some(url.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// 以 KB 为单位的大小，保留两位小数
    pub fn size_kb(&self) -> String {
        format!("{:.2}", self.size_bytes as f64 / 1024.0)
    }

    pub fn modified_display(&self) -> String {
        self.modified_at.format(DATE_FORMAT).to_string()
    }

    pub fn display_url(&self) -> &str {
        self.web_url.as_deref().unwrap_or(&self.remote_ref)
    }

    /// 表格展示与导出共用的一行
    pub fn display_row(&self) -> [String; 5] {
        [
            self.name.clone(),
            self.kind.clone(),
            self.size_kb(),
            self.modified_display(),
            self.display_url().to_string(),
        ]
    }
}

/// 由文件名推导类型：最后一个 '.' 之后的部分
pub fn kind_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => KIND_NOT_AVAILABLE.to_string(),
    }
}

/// 已认证的连接
#[derive(Clone)]
pub struct Session {
    pub login: String,
    pub connected_at: DateTime<Utc>,
    token: String,
}

impl Session {
    pub fn new(login: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            connected_at: Utc::now(),
            token: token.into(),
        }
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("login", &self.login)
            .field("connected_at", &self.connected_at)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// 远程内容存储的抽象接口
#[async_trait]
pub trait RemoteContentClient: Send + Sync {
    /// 认证并建立会话
    async fn connect(&self, identity: &str, credential: &str) -> Result<Session, AuthError>;

    /// 列出当前身份可见的目录（仓库）
    async fn list_directories(&self, session: &Session) -> Result<Vec<String>, FetchError>;

    /// 列出目录下的直接子条目（包含子目录条目，由调用方过滤）
    async fn list_entries(&self, session: &Session, directory: &str)
        -> Result<Vec<Entry>, FetchError>;

    /// 按定位符读取整个文件
    async fn fetch_file_bytes(&self, session: &Session, remote_ref: &str)
        -> Result<Bytes, FetchError>;

    /// 新建文件；同名文件已存在时必须返回冲突而不是覆盖
    async fn create_file(
        &self,
        session: &Session,
        directory: &str,
        file_name: &str,
        message: &str,
        data: Bytes,
    ) -> Result<(), WriteError>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
