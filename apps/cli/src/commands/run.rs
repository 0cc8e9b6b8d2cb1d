//! 运行命令
//!
//! 按配置文件在 SocketCAN 上启动监控循环，所有执行器保持零位，
//! 周期性打印状态，Ctrl-C 后由 IO 线程发零力矩和 Stop 再退出

use crate::config::CliConfig;
use crate::utils::{open_interface, print_metrics, print_states};
use anyhow::{Context, Result};
use clap::Args;
use robstride_driver::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// 运行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件路径（TOML）
    #[arg(short, long)]
    pub config: PathBuf,

    /// 覆盖配置中的 tick 周期（毫秒）
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// 状态打印间隔（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub print_interval_ms: u64,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let mut resolved = CliConfig::load(&self.config)?.resolve()?;
        if let Some(ms) = self.poll_interval_ms {
            resolved.supervisor.poll_interval = Duration::from_millis(ms.max(1));
        }
        let poll_interval = resolved.supervisor.poll_interval;

        let mut builder = Supervisor::builder();
        for interface in &resolved.interfaces {
            println!("🔌 打开接口 {interface}...");
            builder.transport(open_interface(interface)?);
        }
        builder
            .actuators(resolved.actuators.iter().map(|a| a.config))
            .config(resolved.supervisor.clone())
            .host_id(resolved.host_id);
        let supervisor = builder.build()?;

        let ids: Vec<u8> = resolved.actuators.iter().map(|a| a.config.id).collect();
        for actuator in &resolved.actuators {
            supervisor
                .configure(
                    actuator.config.id,
                    actuator.kp,
                    actuator.kd,
                    actuator.max_torque,
                    true,
                )
                .with_context(|| format!("failed to enable actuator {}", actuator.config.id))?;
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        ctrlc::set_handler(move || {
            flag.store(false, Ordering::SeqCst);
        })
        .context("failed to install Ctrl-C handler")?;

        supervisor.start(poll_interval)?;
        println!("✅ 已启动 {} 个执行器，按 Ctrl-C 退出", ids.len());

        let print_interval = Duration::from_millis(self.print_interval_ms);
        let mut last_print = Instant::now();
        while running.load(Ordering::SeqCst) {
            for &id in &ids {
                if let Err(e) = supervisor.command_target(id, 0.0, 0.0, 0.0) {
                    warn!("Command to actuator {} failed: {}", id, e);
                }
            }
            if last_print.elapsed() >= print_interval {
                print_states(&supervisor.get_state(&ids));
                last_print = Instant::now();
            }
            std::thread::sleep(poll_interval);
        }

        println!("🛑 停止所有执行器...");
        supervisor.stop();

        print_metrics(&supervisor.metrics());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_missing_config() {
        let cmd = RunCommand {
            config: PathBuf::from("/nonexistent/robstride.toml"),
            poll_interval_ms: None,
            print_interval_ms: 1000,
        };
        let err = cmd.execute().unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
