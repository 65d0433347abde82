//! 会话上下文
//!
//! 持有当前会话、可见目录列表和当前目录的列表缓存。所有操作都通过该对象进行，
//! 不依赖全局状态；任何操作遇到认证失败都会使会话失效。

use super::cache::{DirectorySelection, Snapshot};
use super::transfer::{
    CancelHandle, DestinationResolver, LocalFile, TransferCoordinator, TransferProgress,
    TransferReport,
};
use super::{export, filter};
use crate::config::AppConfig;
use crate::error::{AuthError, CoreError, PreconditionError};
use crate::remote::{Entry, RemoteContentClient, Session};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct SessionContext {
    client: Arc<dyn RemoteContentClient>,
    session: Option<Session>,
    directories: Vec<String>,
    selection: Option<DirectorySelection>,
    coordinator: TransferCoordinator,
    listing_ttl: u64,
}

impl SessionContext {
    pub fn new(client: Arc<dyn RemoteContentClient>, config: &AppConfig) -> Self {
        Self {
            coordinator: TransferCoordinator::new(client.clone(), config.transfer.clone()),
            client,
            session: None,
            directories: Vec::new(),
            selection: None,
            listing_ttl: config.cache.listing_ttl_secs,
        }
    }

    /// 认证并获取可见目录列表
    pub async fn connect(&mut self, identity: &str, credential: &str) -> Result<&Session, CoreError> {
        self.disconnect();

        let session = self.client.connect(identity, credential).await?;
        info!("会话已建立: {} ({})", session.login, self.client.name());
        self.session = Some(session);

        // 目录列表获取失败时不保留半建立的会话
        let listed = self.refresh_directories().await.map(|_| ());
        if let Err(e) = listed {
            self.disconnect();
            return Err(e);
        }
        self.active_session().map_err(CoreError::from)
    }

    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            info!("会话已断开: {}", session.login);
        }
        self.directories.clear();
        self.selection = None;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn active_session(&self) -> Result<&Session, PreconditionError> {
        self.session.as_ref().ok_or(PreconditionError::NoSession)
    }

    /// 认证失败时丢弃会话，其余错误原样返回
    fn check_auth<E: Into<CoreError>>(&mut self, err: E) -> CoreError {
        let err = err.into();
        if err.is_auth() {
            warn!("认证失败，会话已失效: {}", err);
            self.disconnect();
        }
        err
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    pub async fn refresh_directories(&mut self) -> Result<&[String], CoreError> {
        let session = self.active_session()?.clone();
        match self.client.list_directories(&session).await {
            Ok(dirs) => {
                info!("可见目录 {} 个", dirs.len());
                self.directories = dirs;
                Ok(&self.directories)
            }
            Err(e) => Err(self.check_auth(e)),
        }
    }

    /// 刷新目录列表；切换到新目录时，失败会保留原来的选择
    pub async fn refresh_listing(&mut self, directory: &str) -> Result<Arc<Snapshot>, CoreError> {
        let session = self.active_session()?.clone();

        let (mut selection, previous, switching) = match self.selection.take() {
            Some(current) if current.directory() == directory => (current, None, false),
            previous => (
                DirectorySelection::new(directory, self.listing_ttl),
                previous,
                true,
            ),
        };

        let result = selection.refresh(self.client.as_ref(), &session).await;
        self.selection = if switching && result.is_err() {
            previous
        } else {
            if switching {
                info!("切换到目录 {}", directory);
            }
            Some(selection)
        };

        result.map_err(|e| self.check_auth(e))
    }

    pub fn selection(&self) -> Option<&DirectorySelection> {
        self.selection.as_ref()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.selection.as_ref().and_then(DirectorySelection::snapshot)
    }

    /// 在当前快照上过滤，不访问远程
    pub fn filter(&self, term: &str) -> Vec<Entry> {
        match self.snapshot() {
            Some(snapshot) => filter::filter(snapshot.entries(), term),
            None => Vec::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.coordinator.cancel_handle()
    }

    fn loaded_snapshot(&self, directory: &str) -> Result<Arc<Snapshot>, PreconditionError> {
        self.snapshot()
            .filter(|s| s.directory() == directory)
            .ok_or_else(|| PreconditionError::DirectoryNotLoaded(directory.to_string()))
    }

    /// 批量下载；只有前置条件不满足时返回错误
    pub async fn download_many(
        &mut self,
        directory: &str,
        names: &[String],
        resolver: &dyn DestinationResolver,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferReport, CoreError> {
        let session = self.active_session()?.clone();
        let snapshot = self.loaded_snapshot(directory)?;
        if names.is_empty() {
            return Err(PreconditionError::EmptySelection.into());
        }

        let report = self
            .coordinator
            .download_many(&session, snapshot, names, resolver, progress_tx)
            .await;
        self.after_batch(&report);
        Ok(report)
    }

    /// 批量上传；只有前置条件不满足时返回错误
    pub async fn upload_many(
        &mut self,
        directory: &str,
        items: &[LocalFile],
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<TransferReport, CoreError> {
        let session = self.active_session()?.clone();
        if items.is_empty() {
            return Err(PreconditionError::EmptySelection.into());
        }

        let report = self
            .coordinator
            .upload_many(&session, directory, items, progress_tx)
            .await;

        if report.succeeded() > 0 {
            if let Some(selection) = self.selection.as_mut() {
                if selection.directory() == directory {
                    selection.mark_stale();
                }
            }
        }
        self.after_batch(&report);
        Ok(report)
    }

    fn after_batch(&mut self, report: &TransferReport) {
        if report.auth_failed() {
            let _ = self.check_auth(AuthError::InvalidCredential(
                "credential rejected during transfer".to_string(),
            ));
        }
    }

    /// 导出任意条目集合，与会话状态无关
    pub fn export_rows(&self, entries: &[Entry], destination: &Path) -> Result<(), CoreError> {
        export::export_rows(entries, destination)
    }
}
