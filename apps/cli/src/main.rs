//! # RobStride CLI
//!
//! RobStride 执行器命令行工具
//!
//! ```bash
//! # 扫描总线上的执行器
//! robstride-cli scan --interface can0
//!
//! # 仿真总线上跑 100 个 tick
//! robstride-cli sim --actuators 1:01,2:04 --ticks 100 --position 0.5
//!
//! # 按配置文件运行，保持零位直到 Ctrl-C
//! robstride-cli run --config supervisor.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod utils;

use commands::{RunCommand, ScanCommand, SetIdCommand, SimCommand, TimeoutCommand};

/// RobStride CLI - 执行器命令行工具
#[derive(Parser, Debug)]
#[command(name = "robstride-cli")]
#[command(about = "Command-line interface for RobStride actuators", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描总线上的执行器
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 在仿真总线上运行监控循环
    Sim {
        #[command(flatten)]
        args: SimCommand,
    },

    /// 按配置文件运行，保持零位直到 Ctrl-C
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 修改执行器 CAN ID
    SetId {
        #[command(flatten)]
        args: SetIdCommand,
    },

    /// 设置 CAN 超时
    Timeout {
        #[command(flatten)]
        args: TimeoutCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("robstride_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { args } => args.execute(),
        Commands::Sim { args } => args.execute(),
        Commands::Run { args } => args.execute(),
        Commands::SetId { args } => args.execute(),
        Commands::Timeout { args } => args.execute(),
    }
}
