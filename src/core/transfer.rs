//! 批量传输 - 批量下载与上传
//!
//! 单个条目的失败只记录在报告中，不会中断整个批次。报告中的顺序始终与输入顺序一致。

use super::cache::Snapshot;
use crate::config::TransferConfig;
use crate::remote::{Entry, RemoteContentClient, Session};
use bytes::Bytes;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 上传时使用的提交说明模板
pub fn upload_message(file_name: &str) -> String {
    format!("Upload {}", file_name)
}

/// 批次类型
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Download,
    Upload,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Download => write!(f, "download"),
            TransferKind::Upload => write!(f, "upload"),
        }
    }
}

/// 单个条目的结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ItemOutcome {
    Success,
    Failure(String),
    /// 未处理且不算错误（未选择保存位置、批次已取消）
    Skipped(String),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failure(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ItemOutcome::Skipped(_))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub item_name: String,
    pub outcome: ItemOutcome,
}

/// 批次报告，构造后不再修改
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    batch_id: uuid::Uuid,
    kind: TransferKind,
    items: Vec<ItemReport>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    auth_failed: bool,
    started_at: i64,
    finished_at: i64,
}

impl TransferReport {
    fn new(
        batch_id: uuid::Uuid,
        kind: TransferKind,
        items: Vec<ItemReport>,
        auth_failed: bool,
        started_at: i64,
    ) -> Self {
        let count = |f: fn(&ItemOutcome) -> bool| items.iter().filter(|i| f(&i.outcome)).count();
        let succeeded = count(ItemOutcome::is_success);
        let failed = count(ItemOutcome::is_failure);
        let skipped = count(ItemOutcome::is_skipped);
        Self {
            batch_id,
            kind,
            items,
            succeeded,
            failed,
            skipped,
            auth_failed,
            started_at,
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn batch_id(&self) -> uuid::Uuid {
        self.batch_id
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn items(&self) -> &[ItemReport] {
        &self.items
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// 批次中是否出现认证失败（会话应失效）
    pub fn auth_failed(&self) -> bool {
        self.auth_failed
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn finished_at(&self) -> i64 {
        self.finished_at
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed, {} skipped",
            self.kind, self.succeeded, self.failed, self.skipped
        )
    }
}

/// 每完成一个条目发送一次，按输入顺序
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub batch_id: uuid::Uuid,
    pub kind: TransferKind,
    pub index: usize,
    pub total: usize,
    pub item_name: String,
    pub outcome: ItemOutcome,
}

/// 取消标志，在条目之间检查；批次结束后清除
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 为下载的条目决定本地保存位置；返回 None 表示跳过（例如用户取消了保存对话框）
pub trait DestinationResolver: Send + Sync {
    fn resolve(&self, entry: &Entry) -> Option<PathBuf>;

    /// resolve 返回 None 时记录在报告中的原因
    fn skip_reason(&self, _entry: &Entry) -> String {
        SKIP_NO_DESTINATION.to_string()
    }
}

impl<F> DestinationResolver for F
where
    F: Fn(&Entry) -> Option<PathBuf> + Send + Sync,
{
    fn resolve(&self, entry: &Entry) -> Option<PathBuf> {
        self(entry)
    }
}

/// 保存到指定文件夹，同名文件存在且不允许覆盖时跳过
#[derive(Debug, Clone)]
pub struct FolderResolver {
    folder: PathBuf,
    overwrite: bool,
}

impl FolderResolver {
    pub fn new(folder: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            folder: folder.into(),
            overwrite,
        }
    }
}

impl DestinationResolver for FolderResolver {
    fn resolve(&self, entry: &Entry) -> Option<PathBuf> {
        let path = self.folder.join(&entry.name);
        if !self.overwrite && path.exists() {
            debug!("本地文件已存在，跳过: {:?}", path);
            return None;
        }
        Some(path)
    }

    fn skip_reason(&self, entry: &Entry) -> String {
        format!("'{}' already exists locally", entry.name)
    }
}

/// 待上传的本地文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 远程文件名取本地文件的文件名部分
    pub fn remote_name(&self) -> Option<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }

    fn display_name(&self) -> String {
        self.remote_name()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// 先写临时文件再重命名，避免留下半截文件
async fn write_local(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut temp_name = dest.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".part");
    let temp_path = dest.with_file_name(temp_name);

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    fs::rename(&temp_path, dest).await
}

/// 单个条目的执行结果
struct Attempt {
    outcome: ItemOutcome,
    auth_failed: bool,
}

impl Attempt {
    fn success() -> Self {
        Self {
            outcome: ItemOutcome::Success,
            auth_failed: false,
        }
    }

    fn failure(reason: String, auth_failed: bool) -> Self {
        Self {
            outcome: ItemOutcome::Failure(reason),
            auth_failed,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: ItemOutcome::Skipped(reason.into()),
            auth_failed: false,
        }
    }
}

enum Slot {
    Done(Attempt),
    Running(JoinHandle<Attempt>),
}

const SKIP_NO_DESTINATION: &str = "no destination chosen";
const SKIP_CANCELLED: &str = "batch cancelled";

/// 传输协调器
pub struct TransferCoordinator {
    client: Arc<dyn RemoteContentClient>,
    config: TransferConfig,
    cancel: CancelHandle,
}

impl TransferCoordinator {
    pub fn new(client: Arc<dyn RemoteContentClient>, config: TransferConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancelHandle::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    async fn send_progress(
        tx: &Option<mpsc::Sender<TransferProgress>>,
        progress: TransferProgress,
    ) {
        if let Some(tx) = tx {
            let _ = tx.send(progress).await;
        }
    }

    /// 批量下载
    ///
    /// 保存位置在驱动任务上按输入顺序逐个确定，内容获取与写入最多并发
    /// `max_concurrent_downloads` 个；结果按输入位置收集。
    pub async fn download_many(
        &self,
        session: &Session,
        snapshot: Arc<Snapshot>,
        names: &[String],
        resolver: &dyn DestinationResolver,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> TransferReport {
        let batch_id = uuid::Uuid::new_v4();
        let started_at = chrono::Utc::now().timestamp();
        let total = names.len();

        info!(
            "开始批量下载 {} 个文件: {} (并发 {})",
            total,
            snapshot.directory(),
            self.config.concurrency()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut pending: VecDeque<(usize, Slot)> = VecDeque::with_capacity(total);
        let mut items = Vec::with_capacity(total);
        let mut auth_failed = false;

        for (index, name) in names.iter().enumerate() {
            // 占用下一个并发名额之前，先按顺序汇报队首已结束的条目
            while let Some((_, front)) = pending.front() {
                let ready = match front {
                    Slot::Done(_) => true,
                    Slot::Running(handle) => {
                        handle.is_finished() || semaphore.available_permits() == 0
                    }
                };
                if !ready {
                    break;
                }
                if let Some((done, slot)) = pending.pop_front() {
                    let attempt = Self::settle(slot).await;
                    auth_failed |= attempt.auth_failed;
                    items.push(
                        Self::record(&progress_tx, batch_id, done, total, &names[done], attempt)
                            .await,
                    );
                }
            }

            if self.cancel.is_cancelled() {
                pending.push_back((index, Slot::Done(Attempt::skipped(SKIP_CANCELLED))));
                continue;
            }

            let Some(entry) = snapshot.get(name) else {
                let attempt = Attempt::failure("not found".to_string(), false);
                pending.push_back((index, Slot::Done(attempt)));
                continue;
            };

            let Some(dest) = resolver.resolve(entry) else {
                let reason = resolver.skip_reason(entry);
                debug!("跳过 {}: {}", name, reason);
                pending.push_back((index, Slot::Done(Attempt::skipped(reason))));
                continue;
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    pending.push_back((index, Slot::Done(Attempt::failure(e.to_string(), false))));
                    continue;
                }
            };

            let client = self.client.clone();
            let session = session.clone();
            let entry = entry.clone();

            let handle = tokio::spawn(async move {
                let attempt = Self::download_one(client.as_ref(), &session, &entry, &dest).await;
                drop(permit);
                attempt
            });
            pending.push_back((index, Slot::Running(handle)));
        }

        while let Some((index, slot)) = pending.pop_front() {
            let attempt = Self::settle(slot).await;
            auth_failed |= attempt.auth_failed;
            items.push(
                Self::record(&progress_tx, batch_id, index, total, &names[index], attempt).await,
            );
        }
        self.cancel.reset();

        let report = TransferReport::new(
            batch_id,
            TransferKind::Download,
            items,
            auth_failed,
            started_at,
        );
        info!("批量下载完成: {}", report);
        report
    }

    async fn settle(slot: Slot) -> Attempt {
        match slot {
            Slot::Done(a) => a,
            Slot::Running(handle) => match handle.await {
                Ok(a) => a,
                Err(e) => Attempt::failure(format!("transfer task aborted: {}", e), false),
            },
        }
    }

    /// 记录一个已结束的下载条目并发送进度
    async fn record(
        progress_tx: &Option<mpsc::Sender<TransferProgress>>,
        batch_id: uuid::Uuid,
        index: usize,
        total: usize,
        name: &str,
        attempt: Attempt,
    ) -> ItemReport {
        if let ItemOutcome::Failure(reason) = &attempt.outcome {
            warn!("下载失败 {}: {}", name, reason);
        }

        Self::send_progress(
            progress_tx,
            TransferProgress {
                batch_id,
                kind: TransferKind::Download,
                index,
                total,
                item_name: name.to_string(),
                outcome: attempt.outcome.clone(),
            },
        )
        .await;

        ItemReport {
            item_name: name.to_string(),
            outcome: attempt.outcome,
        }
    }

    async fn download_one(
        client: &dyn RemoteContentClient,
        session: &Session,
        entry: &Entry,
        dest: &Path,
    ) -> Attempt {
        let data = match client.fetch_file_bytes(session, &entry.remote_ref).await {
            Ok(d) => d,
            Err(e) => {
                return Attempt::failure(
                    format!("failed to fetch {}: {}", entry.name, e),
                    e.is_auth(),
                )
            }
        };

        if let Err(e) = write_local(dest, &data).await {
            return Attempt::failure(
                format!("failed to write {} to {}: {}", entry.name, dest.display(), e),
                false,
            );
        }

        debug!("已下载 {} -> {:?} ({} 字节)", entry.name, dest, data.len());
        Attempt::success()
    }

    /// 批量上传，严格按顺序逐个执行
    pub async fn upload_many(
        &self,
        session: &Session,
        directory: &str,
        items: &[LocalFile],
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> TransferReport {
        let batch_id = uuid::Uuid::new_v4();
        let started_at = chrono::Utc::now().timestamp();
        let total = items.len();

        info!("开始批量上传 {} 个文件到 {}", total, directory);

        let mut reports = Vec::with_capacity(total);
        let mut auth_failed = false;

        for (index, item) in items.iter().enumerate() {
            let attempt = if self.cancel.is_cancelled() {
                Attempt::skipped(SKIP_CANCELLED)
            } else {
                self.upload_one(session, directory, item).await
            };
            auth_failed |= attempt.auth_failed;

            let item_name = item.display_name();
            if let ItemOutcome::Failure(reason) = &attempt.outcome {
                warn!("上传失败 {}: {}", item_name, reason);
            }

            Self::send_progress(
                &progress_tx,
                TransferProgress {
                    batch_id,
                    kind: TransferKind::Upload,
                    index,
                    total,
                    item_name: item_name.clone(),
                    outcome: attempt.outcome.clone(),
                },
            )
            .await;

            reports.push(ItemReport {
                item_name,
                outcome: attempt.outcome,
            });
        }

        self.cancel.reset();

        let report = TransferReport::new(
            batch_id,
            TransferKind::Upload,
            reports,
            auth_failed,
            started_at,
        );
        info!("批量上传完成: {}", report);
        report
    }

    async fn upload_one(&self, session: &Session, directory: &str, item: &LocalFile) -> Attempt {
        let Some(file_name) = item.remote_name() else {
            return Attempt::failure(
                format!("cannot derive a file name from {}", item.path.display()),
                false,
            );
        };

        let data = match fs::read(&item.path).await {
            Ok(d) => Bytes::from(d),
            Err(e) => {
                return Attempt::failure(
                    format!("failed to read {}: {}", item.path.display(), e),
                    false,
                )
            }
        };

        let size = data.len();
        match self
            .client
            .create_file(session, directory, &file_name, &upload_message(&file_name), data)
            .await
        {
            Ok(()) => {
                debug!("已上传 {} -> {} ({} 字节)", file_name, directory, size);
                Attempt::success()
            }
            Err(e) => Attempt::failure(
                format!("failed to upload {}: {}", file_name, e),
                e.is_auth(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, FetchError, WriteError};
    use crate::remote::LocalClient;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 包装本地客户端，对指定文件注入故障并记录调用顺序
    struct FlakyClient {
        inner: LocalClient,
        network_failures: HashSet<String>,
        auth_failures: HashSet<String>,
        fetched: Mutex<Vec<String>>,
    }

    impl FlakyClient {
        fn new(inner: LocalClient) -> Self {
            Self {
                inner,
                network_failures: HashSet::new(),
                auth_failures: HashSet::new(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fail_network(mut self, name: &str) -> Self {
            self.network_failures.insert(name.to_string());
            self
        }

        fn fail_auth(mut self, name: &str) -> Self {
            self.auth_failures.insert(name.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    fn file_name_of(remote_ref: &str) -> String {
        Path::new(remote_ref)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string()
    }

    #[async_trait]
    impl RemoteContentClient for FlakyClient {
        async fn connect(&self, identity: &str, credential: &str) -> Result<Session, AuthError> {
            self.inner.connect(identity, credential).await
        }

        async fn list_directories(&self, session: &Session) -> Result<Vec<String>, FetchError> {
            self.inner.list_directories(session).await
        }

        async fn list_entries(
            &self,
            session: &Session,
            directory: &str,
        ) -> Result<Vec<Entry>, FetchError> {
            self.inner.list_entries(session, directory).await
        }

        async fn fetch_file_bytes(
            &self,
            session: &Session,
            remote_ref: &str,
        ) -> Result<Bytes, FetchError> {
            let name = file_name_of(remote_ref);
            self.fetched.lock().unwrap().push(name.clone());
            if self.network_failures.contains(&name) {
                return Err(FetchError::Network("connection reset by peer".to_string()));
            }
            if self.auth_failures.contains(&name) {
                return Err(AuthError::InvalidCredential("token expired".to_string()).into());
            }
            self.inner.fetch_file_bytes(session, remote_ref).await
        }

        async fn create_file(
            &self,
            session: &Session,
            directory: &str,
            file_name: &str,
            message: &str,
            data: Bytes,
        ) -> Result<(), WriteError> {
            if self.auth_failures.contains(file_name) {
                return Err(AuthError::InvalidCredential("token expired".to_string()).into());
            }
            self.inner
                .create_file(session, directory, file_name, message, data)
                .await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct Fixture {
        remote: TempDir,
        local: TempDir,
        client: Arc<FlakyClient>,
        session: Session,
        snapshot: Arc<Snapshot>,
    }

    const FILES: [&str; 5] = ["item1.txt", "item2.txt", "item3.txt", "item4.txt", "item5.txt"];

    async fn fixture(wrap: impl FnOnce(FlakyClient) -> FlakyClient) -> Fixture {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        std::fs::create_dir_all(remote.path().join("repo")).unwrap();
        for name in FILES {
            std::fs::write(remote.path().join("repo").join(name), name.as_bytes()).unwrap();
        }

        let client = Arc::new(wrap(FlakyClient::new(LocalClient::new(remote.path()).unwrap())));
        let session = client.connect("tester", "token").await.unwrap();
        let entries = client.list_entries(&session, "repo").await.unwrap();
        let snapshot = Arc::new(Snapshot::new("repo", entries));

        Fixture {
            remote,
            local,
            client,
            session,
            snapshot,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn coordinator(client: Arc<FlakyClient>, concurrency: usize) -> TransferCoordinator {
        TransferCoordinator::new(
            client,
            TransferConfig {
                max_concurrent_downloads: concurrency,
            },
        )
    }

    #[tokio::test]
    async fn test_download_failure_is_isolated() {
        let fx = fixture(|c| c.fail_network("item3.txt")).await;
        let coord = coordinator(fx.client.clone(), 1);
        let resolver = FolderResolver::new(fx.local.path(), false);

        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &names(&FILES), &resolver, None)
            .await;

        assert_eq!(report.total(), 5);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 0);
        assert!(!report.auth_failed());

        let order: Vec<_> = report.items().iter().map(|i| i.item_name.as_str()).collect();
        assert_eq!(order, FILES.to_vec());
        match &report.items()[2].outcome {
            ItemOutcome::Failure(reason) => assert!(reason.contains("item3.txt"), "{}", reason),
            other => panic!("unexpected outcome {:?}", other),
        }

        // 失败之后的条目仍被处理
        assert_eq!(fx.client.fetched(), names(&FILES));
        assert_eq!(
            std::fs::read(fx.local.path().join("item5.txt")).unwrap(),
            b"item5.txt"
        );
        assert!(!fx.local.path().join("item3.txt").exists());
    }

    #[tokio::test]
    async fn test_download_unknown_name_and_skipped_destination() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);
        let folder = fx.local.path().to_path_buf();
        let resolver = move |entry: &Entry| {
            if entry.name == "item2.txt" {
                None
            } else {
                Some(folder.join(&entry.name))
            }
        };

        let report = coord
            .download_many(
                &fx.session,
                fx.snapshot.clone(),
                &names(&["item1.txt", "ghost.txt", "item2.txt"]),
                &resolver,
                None,
            )
            .await;

        assert_eq!(report.items()[0].outcome, ItemOutcome::Success);
        assert_eq!(
            report.items()[1].outcome,
            ItemOutcome::Failure("not found".to_string())
        );
        assert!(report.items()[2].outcome.is_skipped());
        assert_eq!((report.succeeded(), report.failed(), report.skipped()), (1, 1, 1));
        // 跳过的条目不会发起下载
        assert_eq!(fx.client.fetched(), names(&["item1.txt"]));
    }

    #[tokio::test]
    async fn test_concurrent_download_keeps_input_order() {
        let fx = fixture(|c| c.fail_network("item2.txt")).await;
        let coord = coordinator(fx.client.clone(), 4);
        let resolver = FolderResolver::new(fx.local.path().join("nested/out"), false);
        let mut order = names(&FILES);
        order.reverse();

        let (tx, mut rx) = mpsc::channel(16);
        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &order, &resolver, Some(tx))
            .await;

        let reported: Vec<_> = report.items().iter().map(|i| i.item_name.clone()).collect();
        assert_eq!(reported, order);
        assert_eq!(report.failed(), 1);
        assert!(report.items()[3].outcome.is_failure());

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            assert_eq!(p.total, 5);
            seen.push((p.index, p.item_name));
        }
        let expected: Vec<_> = order.iter().cloned().enumerate().collect();
        assert_eq!(seen, expected);
        assert!(fx.local.path().join("nested/out/item1.txt").exists());
    }

    #[tokio::test]
    async fn test_auth_failure_is_flagged() {
        let fx = fixture(|c| c.fail_auth("item1.txt")).await;
        let coord = coordinator(fx.client.clone(), 1);
        let resolver = FolderResolver::new(fx.local.path(), true);

        let report = coord
            .download_many(
                &fx.session,
                fx.snapshot.clone(),
                &names(&["item1.txt", "item2.txt"]),
                &resolver,
                None,
            )
            .await;
        assert!(report.auth_failed());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_remaining() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);
        let handle = coord.cancel_handle();
        let folder = fx.local.path().to_path_buf();
        let resolver = move |entry: &Entry| {
            if entry.name == "item2.txt" {
                handle.cancel();
            }
            Some(folder.join(&entry.name))
        };

        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &names(&FILES), &resolver, None)
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 3);
        assert_eq!(
            report.items()[4].outcome,
            ItemOutcome::Skipped("batch cancelled".to_string())
        );
    }

    #[tokio::test]
    async fn test_progress_reported_as_items_finish() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);
        let resolver = FolderResolver::new(fx.local.path(), false);

        let (tx, mut rx) = mpsc::channel::<TransferProgress>(16);
        let client = fx.client.clone();
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(p) = rx.recv().await {
                seen.push((p.index, client.fetched().len()));
            }
            seen
        });

        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &names(&FILES), &resolver, Some(tx))
            .await;
        assert_eq!(report.succeeded(), 5);

        let seen = watcher.await.unwrap();
        let indexes: Vec<_> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        // 第一个事件在剩余条目获取之前就已送达
        assert!(seen[0].1 <= 2, "{:?}", seen);
    }

    #[tokio::test]
    async fn test_cancel_before_batch_is_honoured_then_cleared() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);
        let resolver = FolderResolver::new(fx.local.path(), false);
        let batch = names(&FILES[..2]);

        coord.cancel_handle().cancel();
        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &batch, &resolver, None)
            .await;
        assert_eq!(report.skipped(), 2);
        assert!(fx.client.fetched().is_empty());
        assert!(!coord.cancel_handle().is_cancelled());

        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &batch, &resolver, None)
            .await;
        assert_eq!(report.succeeded(), 2);
    }

    #[tokio::test]
    async fn test_existing_local_file_is_skipped_with_reason() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);
        std::fs::write(fx.local.path().join("item1.txt"), b"mine").unwrap();
        let resolver = FolderResolver::new(fx.local.path(), false);

        let report = coord
            .download_many(&fx.session, fx.snapshot.clone(), &names(&FILES[..2]), &resolver, None)
            .await;
        assert_eq!(
            report.items()[0].outcome,
            ItemOutcome::Skipped("'item1.txt' already exists locally".to_string())
        );
        assert_eq!(report.items()[1].outcome, ItemOutcome::Success);
        assert_eq!(std::fs::read(fx.local.path().join("item1.txt")).unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_upload_conflict_does_not_affect_others() {
        let fx = fixture(|c| c).await;
        let coord = coordinator(fx.client.clone(), 1);

        let new_a = fx.local.path().join("new_a.txt");
        let clash = fx.local.path().join("item2.txt");
        let new_b = fx.local.path().join("new_b.txt");
        std::fs::write(&new_a, b"a").unwrap();
        std::fs::write(&clash, b"local copy").unwrap();
        std::fs::write(&new_b, b"b").unwrap();

        let items = vec![
            LocalFile::new(&new_a),
            LocalFile::new(&clash),
            LocalFile::new(fx.local.path().join("missing.txt")),
            LocalFile::new(&new_b),
        ];
        let report = coord.upload_many(&fx.session, "repo", &items, None).await;

        assert_eq!(report.kind(), TransferKind::Upload);
        assert_eq!((report.succeeded(), report.failed()), (2, 2));
        match &report.items()[1].outcome {
            ItemOutcome::Failure(reason) => {
                assert!(reason.contains("conflict"), "{}", reason);
                assert!(reason.contains("item2.txt"), "{}", reason);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(report.items()[2].outcome.is_failure());
        assert_eq!(report.items()[3].outcome, ItemOutcome::Success);

        let repo = fx.remote.path().join("repo");
        assert_eq!(std::fs::read(repo.join("item2.txt")).unwrap(), b"item2.txt");
        assert_eq!(std::fs::read(repo.join("new_b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_report_serialization() {
        let report = TransferReport::new(
            uuid::Uuid::nil(),
            TransferKind::Download,
            vec![
                ItemReport {
                    item_name: "a".into(),
                    outcome: ItemOutcome::Success,
                },
                ItemReport {
                    item_name: "b".into(),
                    outcome: ItemOutcome::Failure("boom".into()),
                },
            ],
            false,
            0,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "download");
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["items"][1]["itemName"], "b");
        assert_eq!(json["items"][1]["outcome"]["status"], "failure");
        assert_eq!(json["items"][1]["outcome"]["reason"], "boom");
        assert_eq!(report.to_string(), "download: 1 succeeded, 1 failed, 0 skipped");
    }

    #[test]
    fn test_upload_message_and_remote_name() {
        assert_eq!(upload_message("a.txt"), "Upload a.txt");
        assert_eq!(
            LocalFile::new("/tmp/dir/report.csv").remote_name().as_deref(),
            Some("report.csv")
        );
        assert_eq!(LocalFile::new("/").remote_name(), None);
    }
}
