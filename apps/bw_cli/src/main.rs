// apps/bw_cli/src/main.rs

//! BlastWave 命令行界面
//!
//! 可压缩多材料流求解器的命令行工具。
//!
//! # 架构层级
//!
//! 应用层只做装配与调度：配置解析、日志初始化、rank 启动与
//! 输出；数值内容全部在 bw_physics / bw_surface。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// BlastWave 可压缩多材料流求解器命令行工具
#[derive(Parser)]
#[command(name = "bw_cli")]
#[command(author = "BlastWave Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "BlastWave multi-material compressible flow solver", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 显示配置信息
    Info(commands::info::InfoArgs),
    /// 校验配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 执行命令
    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
