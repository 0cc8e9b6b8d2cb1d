//! 扫描命令
//!
//! 向 1..=254 广播获取设备 ID，列出应答的执行器

use crate::utils::open_interface;
use anyhow::Result;
use clap::Args;
use robstride_can::Transport;
use robstride_driver::Supervisor;
use std::time::Duration;

/// 扫描命令参数
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// CAN 接口
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    /// 等待应答的时长（毫秒）
    #[arg(short, long, default_value_t = 500)]
    pub timeout_ms: u64,
}

impl ScanCommand {
    pub fn execute(&self) -> Result<()> {
        println!("🔌 打开接口 {}...", self.interface);
        let transport = open_interface(&self.interface)?;

        println!("🔍 扫描 ID 1..=254...");
        let found = scan_transport(transport, Duration::from_millis(self.timeout_ms))?;

        if found.is_empty() {
            println!("⚠️  没有执行器应答");
        } else {
            println!("✅ 发现 {} 个执行器:", found.len());
            for id in found {
                println!("   - {id} (0x{id:02X})");
            }
        }
        Ok(())
    }
}

/// 在单条总线上扫描，返回按 ID 升序的应答列表
pub fn scan_transport(transport: impl Transport + 'static, timeout: Duration) -> Result<Vec<u8>> {
    let mut builder = Supervisor::builder();
    builder.transport(transport);
    let supervisor = builder.build()?;
    Ok(supervisor.scan(0, timeout)?)
}
