//! GitHub REST API 实现
//!
//! 目录对应当前用户名下的仓库，条目为仓库根目录的内容。

use super::{Entry, EntryType, RemoteContentClient, Session};
use crate::config::RemoteConfig;
use crate::error::{AuthError, FetchError, WriteError};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LAST_MODIFIED};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    transfer_timeout: Duration,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    name: String,
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    size: u64,
    download_url: Option<String>,
    html_url: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl GitHubClient {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let name = format!("github:{}", base_url);
        info!("初始化 GitHub 客户端: {}", base_url);

        Ok(Self {
            http,
            base_url,
            transfer_timeout: Duration::from_secs(config.transfer_timeout_secs),
            name,
        })
    }

    fn get(&self, session: &Session, url: &str) -> RequestBuilder {
        self.http.get(url).header(AUTHORIZATION, bearer(session.token()))
    }

    fn repo_url(&self, session: &Session, directory: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.base_url,
            urlencoding::encode(&session.login),
            urlencoding::encode(directory)
        )
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// 从错误响应体中取出 message 字段
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    }
}

fn network_fetch(e: reqwest::Error) -> FetchError {
    FetchError::Network(e.to_string())
}

fn network_write(e: reqwest::Error) -> WriteError {
    WriteError::Network(e.to_string())
}

/// 状态码到读取错误的映射
fn classify_fetch(status: StatusCode, message: String, target: &str) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED => AuthError::InvalidCredential(message).into(),
        StatusCode::NOT_FOUND => FetchError::NotFound(target.to_string()),
        _ => FetchError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// 状态码到写入错误的映射
///
/// 409 表示同名文件已存在；422 只有在提示缺少 sha 时才是同名冲突，其余是普通校验失败。
fn classify_write(status: StatusCode, message: String, file_name: &str) -> WriteError {
    let name_taken = status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("\"sha\""));
    match status {
        StatusCode::UNAUTHORIZED => AuthError::InvalidCredential(message).into(),
        _ if name_taken => {
            WriteError::Conflict(format!("'{}' already exists ({})", file_name, message))
        }
        _ => WriteError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

async fn fetch_failure(resp: Response, target: &str) -> FetchError {
    let status = resp.status();
    classify_fetch(status, error_message(resp).await, target)
}

async fn write_failure(resp: Response, file_name: &str) -> WriteError {
    let status = resp.status();
    classify_write(status, error_message(resp).await, file_name)
}

/// 解析 Last-Modified（RFC 2822 格式），缺失时使用获取时间
fn parse_last_modified(value: Option<&HeaderValue>, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fetched_at)
}

fn to_entry(item: ContentResponse, modified_at: DateTime<Utc>) -> Entry {
    let remote_ref = item.download_url.unwrap_or(item.url);
    let entry = Entry::new(
        item.name,
        EntryType::from(item.typ.as_str()),
        item.size,
        modified_at,
        remote_ref,
    );
    match item.html_url {
        Some(url) => entry.with_web_url(url),
        None => entry,
    }
}

#[async_trait]
impl RemoteContentClient for GitHubClient {
    async fn connect(&self, identity: &str, credential: &str) -> Result<Session, AuthError> {
        if credential.trim().is_empty() {
            return Err(AuthError::InvalidCredential("empty token".to_string()));
        }

        let resp = self
            .http
            .get(format!("{}/user", self.base_url))
            .header(AUTHORIZATION, bearer(credential))
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            return Err(AuthError::Forbidden(error_message(resp).await));
        }
        if !status.is_success() {
            return Err(AuthError::InvalidCredential(error_message(resp).await));
        }

        let user: UserResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidCredential(format!("unexpected /user response: {}", e)))?;

        if !identity.is_empty() && !identity.eq_ignore_ascii_case(&user.login) {
            debug!("用户名 {} 与令牌所属用户 {} 不一致，以令牌为准", identity, user.login);
        }

        info!("已连接 GitHub: {}", user.login);
        Ok(Session::new(user.login, credential))
    }

    async fn list_directories(&self, session: &Session) -> Result<Vec<String>, FetchError> {
        let mut names = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/user/repos?affiliation=owner&sort=full_name&per_page={}&page={}",
                self.base_url, PER_PAGE, page
            );
            let resp = self.get(session, &url).send().await.map_err(network_fetch)?;
            if !resp.status().is_success() {
                return Err(fetch_failure(resp, "repositories").await);
            }

            let repos: Vec<RepoResponse> = resp
                .json()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            let count = repos.len();
            names.extend(repos.into_iter().map(|r| r.name));

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("获取到 {} 个仓库", names.len());
        Ok(names)
    }

    async fn list_entries(
        &self,
        session: &Session,
        directory: &str,
    ) -> Result<Vec<Entry>, FetchError> {
        let url = format!("{}/contents/", self.repo_url(session, directory));
        let resp = self.get(session, &url).send().await.map_err(network_fetch)?;
        if !resp.status().is_success() {
            return Err(fetch_failure(resp, directory).await);
        }

        let modified_at = parse_last_modified(resp.headers().get(LAST_MODIFIED), Utc::now());
        let items: Vec<ContentResponse> = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(items
            .into_iter()
            .map(|item| to_entry(item, modified_at))
            .collect())
    }

    async fn fetch_file_bytes(
        &self,
        session: &Session,
        remote_ref: &str,
    ) -> Result<Bytes, FetchError> {
        let resp = self
            .get(session, remote_ref)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(network_fetch)?;
        if !resp.status().is_success() {
            return Err(fetch_failure(resp, remote_ref).await);
        }
        resp.bytes().await.map_err(network_fetch)
    }

    async fn create_file(
        &self,
        session: &Session,
        directory: &str,
        file_name: &str,
        message: &str,
        data: Bytes,
    ) -> Result<(), WriteError> {
        let url = format!(
            "{}/contents/{}",
            self.repo_url(session, directory),
            urlencoding::encode(file_name)
        );
        let body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(&data),
        });

        let resp = self
            .http
            .put(&url)
            .header(AUTHORIZATION, bearer(session.token()))
            .timeout(self.transfer_timeout)
            .json(&body)
            .send()
            .await
            .map_err(network_write)?;

        if !resp.status().is_success() {
            return Err(write_failure(resp, file_name).await);
        }

        debug!("已创建 {}/{}", directory, file_name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
