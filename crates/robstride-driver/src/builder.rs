//! Builder 模式实现
//!
//! 提供构造 `Supervisor` 实例的便捷方式。

use crate::actuator::ActuatorConfig;
use crate::clock::{Clock, SystemClock};
use crate::error::DriverError;
use crate::pipeline::SupervisorConfig;
use crate::supervisor::Supervisor;
use robstride_can::Transport;
use robstride_protocol::DEFAULT_HOST_ID;
use std::sync::Arc;

/// Supervisor Builder
///
/// `transport` 返回该 transport 的下标，供 [`ActuatorConfig::on_transport`] 使用。
///
/// # Example
///
/// ```
/// use robstride_can::SimTransport;
/// use robstride_driver::{ActuatorConfig, ManualClock, Supervisor, SupervisorConfig};
/// use robstride_protocol::ActuatorType;
/// use std::sync::Arc;
///
/// let mut builder = Supervisor::builder();
/// let left = builder.transport(SimTransport::new(&[(1, ActuatorType::Type01)]));
/// let right = builder.transport(SimTransport::new(&[(1, ActuatorType::Type01)]));
/// assert_eq!((left, right), (0, 1));
///
/// builder
///     .actuator(ActuatorConfig::new(1, ActuatorType::Type01).on_transport(left))
///     .config(SupervisorConfig::default())
///     .clock(Arc::new(ManualClock::new()));
/// let supervisor = builder.build().unwrap();
/// ```
#[derive(Default)]
pub struct SupervisorBuilder {
    transports: Vec<Box<dyn Transport>>,
    actuators: Vec<ActuatorConfig>,
    config: Option<SupervisorConfig>,
    clock: Option<Arc<dyn Clock>>,
    host_id: Option<u8>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个 transport，返回其下标
    pub fn transport(&mut self, transport: impl Transport + 'static) -> usize {
        self.transports.push(Box::new(transport));
        self.transports.len() - 1
    }

    pub fn actuator(&mut self, config: ActuatorConfig) -> &mut Self {
        self.actuators.push(config);
        self
    }

    pub fn actuators(&mut self, configs: impl IntoIterator<Item = ActuatorConfig>) -> &mut Self {
        self.actuators.extend(configs);
        self
    }

    pub fn config(&mut self, config: SupervisorConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// 注入时钟（默认 [`SystemClock`]）
    pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = Some(clock);
        self
    }

    /// 主机 ID（默认 0）
    pub fn host_id(&mut self, host_id: u8) -> &mut Self {
        self.host_id = Some(host_id);
        self
    }

    /// 创建 Supervisor 并注册全部执行器
    pub fn build(self) -> Result<Supervisor, DriverError> {
        let supervisor = Supervisor::new(
            self.transports,
            self.config.unwrap_or_default(),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            self.host_id.unwrap_or(DEFAULT_HOST_ID),
        )?;
        supervisor.register(&self.actuators)?;
        Ok(supervisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robstride_can::SimTransport;
    use robstride_protocol::ActuatorType;

    #[test]
    fn test_builder_invalid_transport_index() {
        let mut builder = SupervisorBuilder::new();
        builder.transport(SimTransport::new(&[]));
        builder.actuator(ActuatorConfig::new(1, ActuatorType::Type02).on_transport(1));
        let err = builder.build().err().unwrap();
        assert!(matches!(
            err,
            DriverError::InvalidTransportIndex {
                index: 1,
                available: 1
            }
        ));
    }

    #[test]
    fn test_builder_host_id() {
        let sim = SimTransport::new(&[(3, ActuatorType::Type02)]).with_host_id(0xFD);
        let handle = sim.handle();
        let mut builder = SupervisorBuilder::new();
        builder.transport(sim);
        builder
            .actuator(ActuatorConfig::new(3, ActuatorType::Type02))
            .host_id(0xFD);
        let supervisor = builder.build().unwrap();

        supervisor.request_feedback(3).unwrap();
        let sent = handle.sent_frames();
        assert_eq!(sent[0].arbitration_id().unwrap().data_low(), 0xFD);

        supervisor.poll_once().unwrap();
        assert!(supervisor.get_state(&[3])[0].online);
    }
}
