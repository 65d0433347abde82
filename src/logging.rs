//! 日志模块 - 提供文件日志和大小管理功能

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const LOG_FILE: &str = "gitshelf.log";

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// 是否启用日志记录
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: 5,
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn load(config_dir: &Path) -> Self {
        let mut config: Self = crate::config::load_section(config_dir, "log");
        config.max_size_mb = config.max_size_mb.clamp(1, 100);
        config
    }

    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        crate::config::save_section(config_dir, "log", self)
    }

    /// 设置日志级别，非法级别返回错误
    pub fn set_level(&mut self, level: &str) -> Result<(), String> {
        let level = level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(format!("invalid log level: {}", level));
        }
        self.level = level;
        Ok(())
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 超过大小上限时轮转为 .old 的日志文件
///
/// 由 tracing-appender 的后台线程独占写入，因此不需要内部加锁。
pub struct RotatingFile {
    file_path: PathBuf,
    max_size: u64,
    written: u64,
    writer: BufWriter<File>,
}

impl RotatingFile {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = u64::from(max_size_mb) * 1024 * 1024;

        let current = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        if current > max_size {
            Self::rotate_log(&file_path)?;
        }
        let (writer, written) = Self::open_file(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            written,
            writer,
        })
    }

    fn open_file(file_path: &Path) -> io::Result<(BufWriter<File>, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok((BufWriter::new(file), len))
    }

    /// 当前日志重命名为 gitshelf.log.old，覆盖旧备份
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        Self::rotate_log(&self.file_path)?;
        let (writer, written) = Self::open_file(&self.file_path)?;
        self.writer = writer;
        self.written = written;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        self.writer.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 日志目录跟随应用数据目录
pub fn log_dir(app_dir: &Path) -> PathBuf {
    app_dir.join("logs")
}
