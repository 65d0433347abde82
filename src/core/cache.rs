//! 目录列表缓存
//!
//! 只保存当前目录最近一次成功获取的快照。快照不可变，刷新时整体替换；
//! 获取失败时保留旧快照并把错误返回给调用方。

use crate::error::FetchError;
use crate::remote::{Entry, RemoteContentClient, Session};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 某个目录在某一时刻的文件列表
#[derive(Debug)]
pub struct Snapshot {
    directory: String,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// 只保留文件条目；同名条目保留第一个
    pub fn new(directory: impl Into<String>, raw: Vec<Entry>) -> Self {
        let directory = directory.into();
        let mut entries = Vec::with_capacity(raw.len());
        let mut index = HashMap::with_capacity(raw.len());

        for entry in raw.into_iter().filter(Entry::is_file) {
            if index.contains_key(&entry.name) {
                warn!("目录 {} 中存在重复文件名 {}，已忽略", directory, entry.name);
                continue;
            }
            index.insert(entry.name.clone(), entries.len());
            entries.push(entry);
        }

        Self {
            directory,
            entries,
            index,
            fetched_at: Utc::now(),
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// 快照存在时间（秒）
    pub fn age_secs(&self) -> u64 {
        (Utc::now() - self.fetched_at).num_seconds().max(0) as u64
    }
}

/// 列表缓存管理器
#[derive(Debug, Default)]
pub struct ListingCache {
    snapshot: Option<Arc<Snapshot>>,
    /// 快照视为过期的时长（秒），0 表示不按时间过期
    ttl_seconds: u64,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置过期时长（0 表示不按时间过期）
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    /// 从远程重新获取目录列表并整体替换快照
    pub async fn refresh(
        &mut self,
        client: &dyn RemoteContentClient,
        session: &Session,
        directory: &str,
    ) -> Result<Arc<Snapshot>, FetchError> {
        let raw = client.list_entries(session, directory).await?;
        let total = raw.len();
        let snapshot = Arc::new(Snapshot::new(directory, raw));

        info!(
            "已刷新 {} 的列表: {} 个文件（共 {} 个条目）",
            directory,
            snapshot.len(),
            total
        );

        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    /// 是否超过过期时长（仅作提示，不会自动刷新）
    pub fn is_expired(&self) -> bool {
        match &self.snapshot {
            Some(s) => self.ttl_seconds > 0 && s.age_secs() > self.ttl_seconds,
            None => false,
        }
    }
}

/// 当前选中的目录及其列表缓存
#[derive(Debug)]
pub struct DirectorySelection {
    directory: String,
    cache: ListingCache,
    /// 上传成功后远程内容已变化，需要手动刷新
    stale: bool,
}

impl DirectorySelection {
    pub fn new(directory: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            directory: directory.into(),
            cache: ListingCache::new().with_ttl(ttl_seconds),
            stale: false,
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cache.snapshot()
    }

    pub async fn refresh(
        &mut self,
        client: &dyn RemoteContentClient,
        session: &Session,
    ) -> Result<Arc<Snapshot>, FetchError> {
        let snapshot = self.cache.refresh(client, session, &self.directory).await?;
        self.stale = false;
        Ok(snapshot)
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale || self.cache.is_expired()
    }
}
