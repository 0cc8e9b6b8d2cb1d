//! CAN 超时命令
//!
//! 执行器在超时时间内收不到指令会自动停止，0 表示关闭

use crate::utils::{open_interface, parse_actuator_id};
use anyhow::{Result, bail};
use clap::Args;
use robstride_driver::{ActuatorConfig, Supervisor};
use robstride_protocol::ActuatorType;

/// CAN 超时命令参数
#[derive(Args, Debug)]
pub struct TimeoutCommand {
    /// CAN 接口
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    /// 执行器 ID
    #[arg(long, value_parser = parse_actuator_id)]
    pub id: u8,

    /// 超时（秒）
    #[arg(short, long)]
    pub seconds: f64,

    /// 执行器型号（01..04）
    #[arg(short = 't', long = "type", default_value = "01")]
    pub actuator_type: ActuatorType,
}

impl TimeoutCommand {
    pub fn execute(&self) -> Result<()> {
        if !self.seconds.is_finite() || self.seconds < 0.0 {
            bail!("timeout must be a non-negative number of seconds");
        }

        let mut builder = Supervisor::builder();
        builder.transport(open_interface(&self.interface)?);
        builder.actuator(ActuatorConfig::new(self.id, self.actuator_type));
        let supervisor = builder.build()?;

        let raw = self.actuator_type.timeout_raw(self.seconds);
        println!(
            "⏱️  执行器 {} CAN 超时 {:.3}s (参数值 {})",
            self.id, self.seconds, raw
        );
        supervisor.set_can_timeout(self.id, self.seconds)?;
        println!("✅ 已写入");
        Ok(())
    }
}
