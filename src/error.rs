//! 错误类型
//!
//! 按失败性质区分：认证失败会使会话失效，读取/写入失败可重试并按条目记录，
//! 前置条件错误在接触远程存储之前直接返回。

use thiserror::Error;

/// 认证失败，需要重新连接
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid or expired credential: {0}")]
    InvalidCredential(String),

    #[error("access denied: {0}")]
    Forbidden(String),

    /// 认证服务不可达，凭证本身未被判定
    #[error("cannot reach the remote store: {0}")]
    Unreachable(String),
}

/// 列表或单个文件读取失败
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }
}

/// 远程创建或本地写入失败（含同名冲突）
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WriteError {
    pub fn is_auth(&self) -> bool {
        matches!(self, WriteError::Auth(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteError::Conflict(_))
    }
}

/// 调用方使用错误，在任何远程操作之前返回
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("not connected: no active session")]
    NoSession,

    #[error("directory '{0}' has not been loaded; refresh its listing first")]
    DirectoryNotLoaded(String),

    #[error("no items selected")]
    EmptySelection,
}

/// 核心操作的统一错误
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl CoreError {
    /// 是否为认证失败（无论包装在哪一层）
    pub fn is_auth(&self) -> bool {
        match self {
            CoreError::Auth(_) => true,
            CoreError::Fetch(e) => e.is_auth(),
            CoreError::Write(e) => e.is_auth(),
            CoreError::Precondition(_) => false,
        }
    }
}
