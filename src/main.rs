// ==========================================
// 高校开放数据入库系统 - 命令行主入口
// ==========================================
// 用法: uni-opendata-ingest <load|reload> --source-dir <DIR>
//       [--db-path <FILE>] [--report <FILE>] [--log-json]
// 退出码: 0 成功 / 1 存在文件级致命错误或运行中止 / 2 初始化失败
// ==========================================

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use uni_opendata_ingest::{
    logging, ConfigManager, IngestOrchestrator, IngestRepositoryImpl, IngestSettings, RunMode,
};

const DB_PATH_ENV: &str = "UNI_INGEST_DB_PATH";

#[derive(Parser)]
#[command(name = "uni-opendata-ingest", version, about = "高校开放数据 CSV 入库")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 首次加载（不清空已有数据）
    Load(RunArgs),
    /// 清空子实体后重新加载
    Reload(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// 源 CSV 目录
    #[arg(long)]
    source_dir: PathBuf,

    /// 目标 SQLite 数据库文件
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// 汇总报告输出文件（JSON）
    #[arg(long)]
    report: Option<PathBuf>,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    log_json: bool,
}

/// 数据库路径: 命令行参数 → 环境变量 → 用户数据目录
fn resolve_db_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let Some(data_dir) = dirs::data_dir() else {
        return Ok(PathBuf::from("./uni_opendata_ingest.db"));
    };
    let dir = data_dir.join("uni-opendata-ingest");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("无法创建数据目录: {}", dir.display()))?;
    Ok(dir.join("ingest.db"))
}

/// 打开数据库、读取配置、构建编排器
async fn setup(args: &RunArgs) -> anyhow::Result<IngestOrchestrator<IngestRepositoryImpl>> {
    let db_path = resolve_db_path(args.db_path.clone())?;
    let db_path_str = db_path.to_string_lossy().to_string();
    info!(db_path = %db_path_str, "使用数据库");

    let repo = IngestRepositoryImpl::new(&db_path_str)
        .with_context(|| format!("无法打开数据库: {}", db_path_str))?;
    let config = ConfigManager::from_connection(repo.connection())
        .context("无法初始化配置管理器")?;
    let settings = IngestSettings::load(&config)
        .await
        .context("配置加载失败")?;
    repo.set_busy_timeout(settings.storage_timeout_ms)
        .context("无法设置 busy_timeout")?;

    let orchestrator = IngestOrchestrator::new(Arc::new(repo), settings)
        .context("模式注册表初始化失败")?;
    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (mode, args) = match cli.command {
        Command::Load(args) => (RunMode::Load, args),
        Command::Reload(args) => (RunMode::Reload, args),
    };

    if args.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    info!("==================================================");
    info!("{} v{}", uni_opendata_ingest::APP_NAME, uni_opendata_ingest::VERSION);
    info!("==================================================");

    let orchestrator = match setup(&args).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %format!("{:#}", e), "初始化失败");
            return ExitCode::from(2);
        }
    };

    // Ctrl-C: 当前文件处理完后停止
    let abort = orchestrator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号,当前文件完成后停止");
            abort.store(true, Ordering::SeqCst);
        }
    });

    let summary = match orchestrator.run(&args.source_dir, mode).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "入库运行无法开始");
            return ExitCode::from(2);
        }
    };

    let reporter = orchestrator.reporter();
    match reporter.render_json(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "汇总渲染失败"),
    }

    if let Some(report_path) = &args.report {
        if let Err(e) = reporter.write_report(&summary, report_path) {
            error!(error = %e, path = %report_path.display(), "汇总报告写出失败");
            return ExitCode::from(1);
        }
    }

    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
