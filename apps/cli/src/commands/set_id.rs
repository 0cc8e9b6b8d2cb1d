//! 修改 CAN ID 命令

use crate::utils::{open_interface, parse_actuator_id};
use anyhow::{Result, bail};
use clap::Args;
use robstride_driver::{ActuatorConfig, Supervisor};
use robstride_protocol::ActuatorType;

/// 修改 CAN ID 命令参数
#[derive(Args, Debug)]
pub struct SetIdCommand {
    /// CAN 接口
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    /// 当前 ID
    #[arg(long, value_parser = parse_actuator_id)]
    pub id: u8,

    /// 新 ID
    #[arg(long, value_parser = parse_actuator_id)]
    pub new_id: u8,

    /// 执行器型号（01..04）
    #[arg(short = 't', long = "type", default_value = "01")]
    pub actuator_type: ActuatorType,
}

impl SetIdCommand {
    pub fn execute(&self) -> Result<()> {
        if self.id == self.new_id {
            bail!("new id equals current id {}", self.id);
        }

        let mut builder = Supervisor::builder();
        builder.transport(open_interface(&self.interface)?);
        builder.actuator(ActuatorConfig::new(self.id, self.actuator_type));
        let supervisor = builder.build()?;

        println!("🔧 修改执行器 ID: {} -> {}", self.id, self.new_id);
        supervisor.set_device_id(self.id, self.new_id)?;
        println!("✅ 已发送，请用 scan 确认");
        Ok(())
    }
}
