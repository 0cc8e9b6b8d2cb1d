//! # RobStride Driver
//!
//! 执行器状态模型与监控循环：
//! - [`Supervisor`]：持有 transport，后台按周期发送运控指令、接收反馈
//! - 运控指令按执行器合并（只保留最新一条），控制面指令按 FIFO 发送
//! - 状态通过拷贝快照读取，调用者从不持有内部状态的引用
//! - 可注入 [`Clock`]，测试中用 [`ManualClock`] 推进时间

mod builder;
pub mod actuator;
pub mod clock;
mod error;
pub mod metrics;
pub mod pipeline;
mod supervisor;

pub use actuator::{ActuatorConfig, ActuatorModel, ActuatorState, ControlConfig};
pub use builder::SupervisorBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, SupervisorMetrics};
pub use pipeline::{FreshnessPolicy, SupervisorConfig};
pub use robstride_protocol::ControlCommand;
pub use supervisor::Supervisor;
