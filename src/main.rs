mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands, ConfigAction, DatastoreArgs};
use pbs_chunk_checker::config::{Config, ReportFormat};
use pbs_chunk_checker::datastore::{Datastore, GuestComments};
use pbs_chunk_checker::models::ScanOutcome;
use pbs_chunk_checker::report::{self, Icon, Icons, PhaseProgress};
use pbs_chunk_checker::scanner::{discover_guest_paths, guest_label, ChunkUsageAnalyzer};
use pbs_chunk_checker::utils::format_elapsed;

/// 被 Ctrl-C 中断时的退出码
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 日志写入 stderr，stdout 只输出报告
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let icons = Icons::new(!cli.no_emoji);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", icons.get(Icon::Error), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        init_config(cli.config.as_deref(), *force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load_or_default()?,
    };
    apply_overrides(&mut config, &cli);

    match cli.command {
        Commands::Scan {
            datastore,
            searchpath,
        } => run_scan(&config, &datastore, &searchpath).await,
        Commands::Guests {
            datastore,
            searchpath,
            show_comments,
        } => run_guests(&config, &datastore, &searchpath, show_comments).await,
        Commands::Config { .. } => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 命令行参数优先于配置文件
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.no_emoji {
        config.display.emoji = false;
    }
    if let Some(format) = cli.format {
        config.display.format = format;
    }
    if let Some(threads) = cli.threads {
        config.scan.threads = threads;
    }
    if let Some(format) = cli.inspect_format {
        config.scan.inspect_format = format;
    }
}

fn init_config(explicit: Option<&Path>, force: bool) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };
    if path.exists() && !force {
        bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
    }

    Config::default().save_to_file(&path)?;
    println!("已写入默认配置: {}", path.display());
    Ok(())
}

async fn open_datastore(args: &DatastoreArgs, config: &Config) -> Result<Datastore> {
    match (&args.datastore, &args.datastore_path) {
        (Some(name), _) => Datastore::resolve(name, config)
            .await
            .with_context(|| format!("无法打开数据存储 '{}'", name)),
        (None, Some(path)) => Datastore::from_path(path, &config.scan.chunk_dir_name)
            .with_context(|| format!("无法打开数据存储 {}", path.display())),
        (None, None) => bail!("需要指定 --datastore 或 --datastore-path"),
    }
}

/// Ctrl-C 触发取消，正在运行的外部命令会被终止
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，正在停止...");
            trigger.cancel();
        }
    });
    cancel
}

fn exit_code(cancel: &CancellationToken) -> ExitCode {
    if cancel.is_cancelled() {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::SUCCESS
    }
}

async fn analyze_with_progress(
    analyzer: &Arc<ChunkUsageAnalyzer>,
    search_path: PathBuf,
    visible: bool,
) -> Result<ScanOutcome> {
    let progress = Arc::new(PhaseProgress::new(visible));
    let reporter = progress.clone();

    let outcome = analyzer
        .clone()
        .analyze_blocking(search_path.clone(), move |phase, done, total| {
            reporter.update(phase, done, total)
        })
        .await
        .with_context(|| format!("分析 {} 失败", search_path.display()));
    progress.finish();
    outcome
}

async fn run_scan(config: &Config, args: &DatastoreArgs, searchpath: &str) -> Result<ExitCode> {
    let datastore = open_datastore(args, config).await?;
    let search_path = datastore.resolve_search_path(searchpath)?;
    let icons = Icons::new(config.display.emoji);
    let table = config.display.format == ReportFormat::Table;

    let cancel = cancel_on_ctrl_c();
    let analyzer = Arc::new(ChunkUsageAnalyzer::from_config(
        config,
        datastore.chunks_root(),
        cancel.clone(),
    )?);

    if table {
        println!("{} 数据存储: {}", icons.get(Icon::Folder), datastore.root().display());
        println!("{} 搜索路径: {}", icons.get(Icon::Index), search_path.display());
        println!("{} 数据块目录: {}", icons.get(Icon::Chunk), analyzer.chunks_root().display());
        println!("{} 线程数: {}", icons.get(Icon::Threads), analyzer.threads());
    }

    let outcome = analyze_with_progress(&analyzer, search_path, table).await?;

    match config.display.format {
        ReportFormat::Table => print!("{}", report::render_usage_summary(&outcome, icons)),
        ReportFormat::Json => println!("{}", report::outcome_to_json(&outcome)?),
    }
    Ok(exit_code(&cancel))
}

async fn run_guests(
    config: &Config,
    args: &DatastoreArgs,
    searchpath: &str,
    show_comments: bool,
) -> Result<ExitCode> {
    let started = Instant::now();
    let datastore = open_datastore(args, config).await?;
    let scan_root = datastore.resolve_search_path(searchpath)?;
    if !scan_root.is_dir() {
        bail!("路径不存在: {}", scan_root.display());
    }

    let icons = Icons::new(config.display.emoji);
    let table = config.display.format == ReportFormat::Table;
    let guests = discover_guest_paths(&scan_root);
    tracing::info!("{} 下发现 {} 个虚拟机/容器", scan_root.display(), guests.len());

    // 备注只能通过数据存储名称查询
    let mut comments = match (&args.datastore, show_comments) {
        (Some(name), true) => Some(GuestComments::new(name, config)),
        (None, true) => {
            tracing::warn!("--show-comments 需要 --datastore，已忽略");
            None
        }
        _ => None,
    };

    let cancel = cancel_on_ctrl_c();
    let analyzer = Arc::new(ChunkUsageAnalyzer::from_config(
        config,
        datastore.chunks_root(),
        cancel.clone(),
    )?);

    if table {
        println!("{} 数据存储: {}", icons.get(Icon::Folder), datastore.root().display());
        println!("{} 数据块目录: {}", icons.get(Icon::Chunk), analyzer.chunks_root().display());
        println!("{} 线程数: {}", icons.get(Icon::Threads), analyzer.threads());
        println!("{} 扫描路径: {}", icons.get(Icon::Index), scan_root.display());
        println!("{} 虚拟机/容器数量: {}", icons.get(Icon::Total), guests.len());
    }

    let mut results = Vec::with_capacity(guests.len());
    for (i, guest) in guests.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let mut label = guest_label(datastore.root(), guest);
        if let Some(comments) = comments.as_mut() {
            if let Some(comment) = comments.comment_for(datastore.root(), guest, &cancel).await {
                label = format!("{} ({})", label, comment);
            }
        }
        if table {
            println!();
            println!("{} [{}/{}] {}", icons.get(Icon::Folder), i + 1, guests.len(), label);
        }

        let outcome = match analyze_with_progress(&analyzer, guest.clone(), table).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("跳过 {}: {:#}", label, err);
                continue;
            }
        };

        if table {
            print!("{}", report::render_guest_usage(&label, &outcome, icons));
        }
        results.push((label, outcome));
    }

    match config.display.format {
        ReportFormat::Table if results.is_empty() => {
            println!("{} 未找到虚拟机或容器", icons.get(Icon::Info));
        }
        ReportFormat::Table => {
            println!();
            print!("{}", report::render_guest_summary(&results, icons));
            if cancel.is_cancelled() {
                println!("{} 扫描被中断，结果不完整", icons.get(Icon::Warning));
            }
        }
        ReportFormat::Json => println!("{}", report::guests_to_json(&results)?),
    }

    if table {
        println!(
            "{} 全部扫描耗时: {}",
            icons.get(Icon::Timer),
            format_elapsed(started.elapsed())
        );
    }
    Ok(exit_code(&cancel))
}
