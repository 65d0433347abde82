use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gitshelf_lib::config::AppConfig;
use gitshelf_lib::core::{
    FolderResolver, ItemOutcome, LocalFile, SessionContext, TransferProgress, TransferReport,
};
use gitshelf_lib::logging::{log_dir, LogConfig, RotatingFile};
use gitshelf_lib::remote::{Entry, GitHubClient, LocalClient, RemoteContentClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "gitshelf", version, about = "Browse, search and batch-transfer repository files")]
struct Cli {
    /// Access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    /// Account name (informational; the token decides the identity)
    #[arg(long, env = "GITHUB_USER", default_value = "")]
    user: String,

    /// Serve directories from a local folder instead of GitHub
    #[arg(long)]
    local_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List visible repositories
    Repos,
    /// List files of a repository
    Ls {
        /// Repository name (defaults to the last used one)
        repo: Option<String>,
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// Download files into a folder
    Download {
        repo: String,
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
        /// Replace local files that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Upload local files as new files
    Upload {
        repo: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Export file rows as CSV
    Export {
        repo: String,
        output: PathBuf,
        #[arg(short, long, default_value = "")]
        filter: String,
        /// Only these files (after filtering)
        names: Vec<String>,
    },
    /// Show or change file logging settings
    Log {
        /// error, warn, info, debug or trace
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        enabled: Option<bool>,
        /// Maximum log file size in MB before rotation
        #[arg(long)]
        max_size_mb: Option<u32>,
    },
}

/// 初始化日志系统
fn init_logging(app_dir: &std::path::Path) -> Option<WorkerGuard> {
    let config = LogConfig::load(app_dir);

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into());
    for noisy in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = noisy.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let file = match RotatingFile::new(&log_dir(app_dir), config.max_size_mb) {
        Ok(f) => f,
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            eprintln!("cannot open log file: {}", e);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .try_init();
            return None;
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    // 在 debug 模式下也输出到控制台
    let console_layer = cfg!(debug_assertions).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Some(guard)
}

fn print_table(entries: &[Entry]) {
    println!(
        "{:<40} {:<10} {:>12} {:<20} URL",
        "File Name", "File Type", "Size (KB)", "Date of Upload"
    );
    for entry in entries {
        let [name, kind, size, date, url] = entry.display_row();
        println!("{:<40} {:<10} {:>12} {:<20} {}", name, kind, size, date, url);
    }
}

fn print_report(report: &TransferReport) {
    for item in report.items() {
        match &item.outcome {
            ItemOutcome::Success => println!("  ok       {}", item.item_name),
            ItemOutcome::Failure(reason) => println!("  FAILED   {}: {}", item.item_name, reason),
            ItemOutcome::Skipped(reason) => println!("  skipped  {}: {}", item.item_name, reason),
        }
    }
    println!("{}", report);
}

/// 后台打印进度，Ctrl-C 请求取消
fn spawn_progress(ctx: &SessionContext) -> mpsc::Sender<TransferProgress> {
    let (tx, mut rx) = mpsc::channel::<TransferProgress>(64);
    tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            eprintln!("[{}/{}] {}", p.index + 1, p.total, p.item_name);
        }
    });

    let cancel = ctx.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling after the current item...");
            cancel.cancel();
        }
    });
    tx
}

/// 修改后的日志设置在下次启动时生效
fn update_log_config(
    app_dir: &std::path::Path,
    level: Option<String>,
    enabled: Option<bool>,
    max_size_mb: Option<u32>,
) -> Result<()> {
    let mut config = LogConfig::load(app_dir);
    let changed = level.is_some() || enabled.is_some() || max_size_mb.is_some();

    if let Some(level) = level {
        config.set_level(&level).map_err(anyhow::Error::msg)?;
    }
    if let Some(enabled) = enabled {
        config.enabled = enabled;
    }
    if let Some(size) = max_size_mb {
        config.max_size_mb = size.clamp(1, 100);
    }
    if changed {
        config.save(app_dir)?;
    }

    println!(
        "enabled: {}, level: {}, max size: {} MB, dir: {}",
        config.enabled,
        config.level,
        config.max_size_mb,
        log_dir(app_dir).display()
    );
    Ok(())
}

async fn run(cli: Cli, app_dir: PathBuf) -> Result<()> {
    if let Command::Log {
        level,
        enabled,
        max_size_mb,
    } = cli.command
    {
        return update_log_config(&app_dir, level, enabled, max_size_mb);
    }

    let config = AppConfig::load(&app_dir);

    let client: Arc<dyn RemoteContentClient> = match &cli.local_root {
        Some(root) => Arc::new(LocalClient::new(root).context("cannot open local root")?),
        None => Arc::new(GitHubClient::new(&config.remote)?),
    };

    let mut ctx = SessionContext::new(client, &config);
    ctx.connect(&cli.user, &cli.token).await?;

    match cli.command {
        Command::Repos => {
            for dir in ctx.directories() {
                println!("{}", dir);
            }
        }
        Command::Ls { repo, filter } => {
            let Some(repo) = repo.or(config.last_directory.clone()) else {
                bail!("no repository given and none used before");
            };
            ctx.refresh_listing(&repo).await?;
            print_table(&ctx.filter(&filter));
            AppConfig::save_last_directory(&app_dir, &repo)?;
        }
        Command::Download {
            repo,
            names,
            dest,
            overwrite,
        } => {
            ctx.refresh_listing(&repo).await?;
            let resolver = FolderResolver::new(dest, overwrite);
            let progress = spawn_progress(&ctx);
            let report = ctx
                .download_many(&repo, &names, &resolver, Some(progress))
                .await?;
            print_report(&report);
        }
        Command::Upload { repo, files } => {
            let items: Vec<LocalFile> = files.into_iter().map(LocalFile::new).collect();
            let progress = spawn_progress(&ctx);
            let report = ctx.upload_many(&repo, &items, Some(progress)).await?;
            print_report(&report);
        }
        Command::Export {
            repo,
            output,
            filter,
            names,
        } => {
            ctx.refresh_listing(&repo).await?;
            let rows: Vec<Entry> = ctx
                .filter(&filter)
                .into_iter()
                .filter(|e| names.is_empty() || names.contains(&e.name))
                .collect();
            ctx.export_rows(&rows, &output)?;
            println!("exported {} rows to {}", rows.len(), output.display());
        }
        Command::Log { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_dir = gitshelf_lib::app_dir();

    // 初始化日志系统
    let _guard = init_logging(&app_dir);

    run(cli, app_dir).await
}
