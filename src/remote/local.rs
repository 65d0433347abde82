use super::{Entry, EntryType, RemoteContentClient, Session};
use crate::error::{AuthError, FetchError, WriteError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 本地文件夹模拟的内容存储：根目录下每个子文件夹是一个目录
pub struct LocalClient {
    base_path: PathBuf,
    /// 设置后 connect 时要求凭证一致
    expected_credential: Option<String>,
    name: String,
}

impl LocalClient {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self {
            base_path,
            expected_credential: None,
            name,
        })
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.expected_credential = Some(credential.into());
        self
    }

    fn resolve_dir(&self, directory: &str) -> Result<PathBuf, String> {
        let directory = directory.trim_matches(|c| c == '/' || c == '\\');
        if directory.is_empty() || !is_plain_name(directory) {
            return Err(format!("invalid directory name '{}'", directory));
        }
        Ok(self.base_path.join(directory))
    }

    /// 定位符必须落在根目录之内
    fn resolve_ref(&self, remote_ref: &str) -> Result<PathBuf, FetchError> {
        let path = PathBuf::from(remote_ref);
        let inside = path
            .strip_prefix(&self.base_path)
            .map(|rel| rel.components().all(|c| matches!(c, std::path::Component::Normal(_))))
            .unwrap_or(false);
        if inside {
            Ok(path)
        } else {
            Err(FetchError::NotFound(remote_ref.to_string()))
        }
    }
}

/// 单段名称，不允许路径分隔符或 "." / ".."
fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

async fn write_temp(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await
}

fn modified_of(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl RemoteContentClient for LocalClient {
    async fn connect(&self, identity: &str, credential: &str) -> Result<Session, AuthError> {
        if let Some(expected) = &self.expected_credential {
            if expected != credential {
                return Err(AuthError::InvalidCredential(
                    "credential rejected by local store".to_string(),
                ));
            }
        }
        let login = if identity.is_empty() { "local" } else { identity };
        Ok(Session::new(login, credential))
    }

    async fn list_directories(&self, _session: &Session) -> Result<Vec<String>, FetchError> {
        let mut dirs = Vec::new();
        let mut reader = fs::read_dir(&self.base_path).await?;
        while let Some(item) = reader.next_entry().await? {
            if item.file_type().await?.is_dir() {
                if let Some(name) = item.file_name().to_str() {
                    dirs.push(name.to_string());
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn list_entries(
        &self,
        _session: &Session,
        directory: &str,
    ) -> Result<Vec<Entry>, FetchError> {
        let dir = self.resolve_dir(directory).map_err(FetchError::NotFound)?;
        let mut reader = match fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(directory.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let metadata = item.metadata().await?;
            let entry_type = if metadata.is_dir() {
                EntryType::Dir
            } else {
                EntryType::File
            };
            entries.push(Entry::new(
                name,
                entry_type,
                if metadata.is_dir() { 0 } else { metadata.len() },
                modified_of(&metadata),
                item.path().to_string_lossy(),
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("{} 列出 {} 个条目: {}", self.name, entries.len(), directory);
        Ok(entries)
    }

    async fn fetch_file_bytes(
        &self,
        _session: &Session,
        remote_ref: &str,
    ) -> Result<Bytes, FetchError> {
        let path = self.resolve_ref(remote_ref)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(remote_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_file(
        &self,
        _session: &Session,
        directory: &str,
        file_name: &str,
        message: &str,
        data: Bytes,
    ) -> Result<(), WriteError> {
        let dir = self
            .resolve_dir(directory)
            .map_err(|message| WriteError::Status { status: 400, message })?;
        if !is_plain_name(file_name) || file_name.is_empty() {
            return Err(WriteError::Status {
                status: 400,
                message: format!("invalid file name '{}'", file_name),
            });
        }
        if !dir.is_dir() {
            return Err(WriteError::Status {
                status: 404,
                message: format!("directory '{}' does not exist", directory),
            });
        }

        // 写完临时文件后再硬链接到目标名；目标已存在时链接失败
        let full_path = dir.join(file_name);
        let temp_path = dir.join(format!("{}.part", file_name));
        if let Err(e) = write_temp(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        let linked = fs::hard_link(&temp_path, &full_path).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(WriteError::Conflict(format!(
                    "'{}' already exists in '{}'",
                    file_name, directory
                )))
            }
            Err(e) => return Err(e.into()),
        }

        debug!("{} 创建文件 {}/{} ({})", self.name, directory, file_name, message);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
