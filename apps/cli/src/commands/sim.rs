//! 仿真命令
//!
//! 在 `SimTransport` 上运行监控循环，手动时钟逐 tick 推进，输出最终状态

use crate::utils::{parse_actuator_list, print_metrics, print_states};
use anyhow::Result;
use clap::Args;
use robstride_can::SimTransport;
use robstride_driver::{ActuatorConfig, ManualClock, Supervisor, SupervisorConfig};
use std::sync::Arc;

/// 仿真命令参数
#[derive(Args, Debug)]
pub struct SimCommand {
    /// 执行器列表，格式 id:type，如 1:01,2:04
    #[arg(short, long, default_value = "1:01")]
    pub actuators: String,

    /// 运行的 tick 数
    #[arg(short, long, default_value_t = 10)]
    pub ticks: u32,

    /// 目标位置（弧度）
    #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub position: f64,

    /// 位置增益
    #[arg(long, default_value_t = 20.0)]
    pub kp: f64,

    /// 速度增益
    #[arg(long, default_value_t = 1.0)]
    pub kd: f64,
}

impl SimCommand {
    pub fn execute(&self) -> Result<()> {
        let supervisor = self.build()?;
        let ids: Vec<u8> = parse_actuator_list(&self.actuators)?
            .iter()
            .map(|&(id, _)| id)
            .collect();

        println!(
            "🤖 仿真 {} 个执行器，{} 个 tick，目标位置 {:.3} rad",
            ids.len(),
            self.ticks,
            self.position
        );
        self.drive(&supervisor, &ids)?;

        print_states(&supervisor.get_state(&ids));
        print_metrics(&supervisor.metrics());
        Ok(())
    }

    fn build(&self) -> Result<Supervisor> {
        let actuators = parse_actuator_list(&self.actuators)?;
        let config = SupervisorConfig::default();

        let mut builder = Supervisor::builder();
        builder.transport(SimTransport::new(&actuators));
        builder
            .actuators(
                actuators
                    .iter()
                    .map(|&(id, ty)| ActuatorConfig::new(id, ty)),
            )
            .config(config)
            .clock(Arc::new(ManualClock::new()));
        let supervisor = builder.build()?;

        for &(id, _) in &actuators {
            supervisor.configure(id, self.kp, self.kd, None, true)?;
        }
        Ok(supervisor)
    }

    /// 每个 tick 给所有执行器下发同一目标
    fn drive(&self, supervisor: &Supervisor, ids: &[u8]) -> Result<()> {
        for _ in 0..self.ticks {
            for &id in ids {
                supervisor.command_target(id, self.position, 0.0, 0.0)?;
            }
            supervisor.poll_once()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(actuators: &str, ticks: u32, position: f64) -> SimCommand {
        SimCommand {
            actuators: actuators.to_string(),
            ticks,
            position,
            kp: 20.0,
            kd: 1.0,
        }
    }

    #[test]
    fn test_sim_reaches_target() {
        let cmd = command("1:01,2:04", 3, 0.5);
        let supervisor = cmd.build().unwrap();
        cmd.drive(&supervisor, &[1, 2]).unwrap();

        for state in supervisor.get_state(&[1, 2]) {
            assert!(state.online);
            assert!((state.position - 0.5).abs() < 1e-3);
        }
        assert_eq!(supervisor.metrics().ticks, 3);
    }

    #[test]
    fn test_sim_rejects_bad_list() {
        assert!(command("1:09", 1, 0.0).build().is_err());
    }
}
