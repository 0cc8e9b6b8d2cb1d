//! 执行器模型
//!
//! 静态注册信息（[`ActuatorConfig`]）与运行时状态（[`ActuatorState`]）。
//! 状态只由 Supervisor 持有和修改，调用者拿到的永远是拷贝。

use crate::error::DriverError;
use robstride_protocol::{ActuatorType, FaultFlags, FaultReport, Feedback, MotorMode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 执行器注册信息，注册后不可变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorConfig {
    /// 总线地址（1..=254）
    pub id: u8,
    pub actuator_type: ActuatorType,
    /// 所在 transport 的下标
    pub transport: usize,
    /// 指令速度绝对值上限，超过则丢弃该指令
    pub max_velocity: Option<f64>,
    /// 指令位置与最近反馈位置之差的上限，超过则丢弃该指令
    pub max_angle_change: Option<f64>,
    /// 两次运控帧之间的最小间隔；间隔内的指令保留到下一个 tick
    pub min_command_interval: Option<Duration>,
}

impl ActuatorConfig {
    pub fn new(id: u8, actuator_type: ActuatorType) -> Self {
        Self {
            id,
            actuator_type,
            transport: 0,
            max_velocity: None,
            max_angle_change: None,
            min_command_interval: None,
        }
    }

    pub fn on_transport(mut self, transport: usize) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_max_velocity(mut self, max_velocity: f64) -> Self {
        self.max_velocity = Some(max_velocity.abs());
        self
    }

    pub fn with_max_angle_change(mut self, max_angle_change: f64) -> Self {
        self.max_angle_change = Some(max_angle_change.abs());
        self
    }

    /// 运控帧限速（Hz），非正数或非有限值表示不限速
    pub fn with_command_rate(mut self, rate_hz: f64) -> Self {
        self.min_command_interval = (rate_hz.is_finite() && rate_hz > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / rate_hz));
        self
    }
}

/// 把位置/速度目标翻译成运控帧时使用的默认增益与限制
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    pub kp: f64,
    pub kd: f64,
    /// `None` 时使用型号的力矩上限
    pub max_torque: Option<f64>,
    pub torque_enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            kd: 0.0,
            max_torque: None,
            torque_enabled: false,
        }
    }
}

impl ControlConfig {
    /// 实际生效的力矩上限：不超过型号上限
    pub fn torque_limit(&self, actuator_type: ActuatorType) -> f64 {
        let type_max = actuator_type.config().torque.max;
        match self.max_torque {
            Some(limit) => limit.abs().min(type_max),
            None => type_max,
        }
    }
}

/// 执行器状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorState {
    pub actuator_id: u8,
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    /// 摄氏度
    pub temperature: f64,
    pub mode: MotorMode,
    pub faults: FaultFlags,
    /// 最近一次故障上报
    pub fault_report: Option<FaultReport>,
    pub online: bool,
    pub messages_received: u64,
    /// 最近一次有效反馈的时间（Supervisor 时钟，微秒）
    pub last_feedback_us: Option<u64>,
}

impl ActuatorState {
    /// 归零、离线的默认状态
    pub fn offline(actuator_id: u8) -> Self {
        Self {
            actuator_id,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
            temperature: 0.0,
            mode: MotorMode::Reset,
            faults: FaultFlags::default(),
            fault_report: None,
            online: false,
            messages_received: 0,
            last_feedback_us: None,
        }
    }
}

#[derive(Debug)]
struct ActuatorRecord {
    config: ActuatorConfig,
    state: ActuatorState,
}

/// 执行器注册表与状态表
#[derive(Debug, Default)]
pub struct ActuatorModel {
    records: HashMap<u8, ActuatorRecord>,
}

impl ActuatorModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个执行器，初始状态为离线
    pub fn register(&mut self, config: ActuatorConfig) -> Result<(), DriverError> {
        if self.records.contains_key(&config.id) {
            return Err(DriverError::DuplicateRegistration { id: config.id });
        }
        self.records.insert(
            config.id,
            ActuatorRecord {
                config,
                state: ActuatorState::offline(config.id),
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: u8) -> bool {
        self.records.contains_key(&id)
    }

    pub fn config(&self, id: u8) -> Option<&ActuatorConfig> {
        self.records.get(&id).map(|r| &r.config)
    }

    pub fn configs(&self) -> impl Iterator<Item = &ActuatorConfig> {
        self.records.values().map(|r| &r.config)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 应用一帧反馈，返回是否发生了 Offline -> Online
    ///
    /// 数值字段按解码结果原样保存（钳位只发生在编码时）。
    pub fn update_from_feedback(
        &mut self,
        id: u8,
        feedback: &Feedback,
        now_us: u64,
    ) -> Result<bool, DriverError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(DriverError::UnknownActuator { id })?;

        let state = &mut record.state;
        let came_online = !state.online;
        state.position = feedback.position;
        state.velocity = feedback.velocity;
        state.torque = feedback.torque;
        state.temperature = feedback.temperature;
        state.mode = feedback.mode;
        state.faults = feedback.faults;
        state.online = true;
        state.messages_received += 1;
        state.last_feedback_us = Some(now_us);

        if came_online {
            debug!("Actuator {} online", id);
        }
        Ok(came_online)
    }

    pub fn record_fault(&mut self, report: FaultReport) -> Result<(), DriverError> {
        let id = report.actuator_id;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(DriverError::UnknownActuator { id })?;
        record.state.fault_report = Some(report);
        Ok(())
    }

    /// 标记离线，返回是否发生了 Online -> Offline
    pub fn mark_offline(&mut self, id: u8) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.state.online => {
                record.state.online = false;
                debug!("Actuator {} offline", id);
                true
            },
            _ => false,
        }
    }

    pub fn state(&self, id: u8) -> Option<&ActuatorState> {
        self.records.get(&id).map(|r| &r.state)
    }

    /// 按请求顺序返回状态拷贝；未注册的 ID 返回离线占位
    pub fn snapshot(&self, ids: &[u8]) -> Vec<ActuatorState> {
        ids.iter()
            .map(|&id| match self.records.get(&id) {
                Some(record) => record.state.clone(),
                None => ActuatorState::offline(id),
            })
            .collect()
    }

    /// 回到归零、离线的默认状态
    pub fn reset(&mut self, id: u8) -> Result<(), DriverError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(DriverError::UnknownActuator { id })?;
        record.state = ActuatorState::offline(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(id: u8, position: f64) -> Feedback {
        Feedback {
            actuator_id: id,
            host_id: 0,
            position,
            velocity: 0.25,
            torque: -1.0,
            temperature: 31.5,
            mode: MotorMode::Run,
            faults: FaultFlags::default(),
        }
    }

    fn model() -> ActuatorModel {
        let mut model = ActuatorModel::new();
        model
            .register(ActuatorConfig::new(1, ActuatorType::Type01))
            .unwrap();
        model
            .register(ActuatorConfig::new(2, ActuatorType::Type04))
            .unwrap();
        model
    }

    #[test]
    fn test_command_rate_interval() {
        let config = ActuatorConfig::new(1, ActuatorType::Type01).with_command_rate(50.0);
        assert_eq!(config.min_command_interval, Some(Duration::from_millis(20)));
        let config = config.with_command_rate(0.0);
        assert_eq!(config.min_command_interval, None);
        let config = config.with_command_rate(f64::NAN);
        assert_eq!(config.min_command_interval, None);
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut model = model();
        let err = model
            .register(ActuatorConfig::new(1, ActuatorType::Type02))
            .unwrap_err();
        assert!(matches!(err, DriverError::DuplicateRegistration { id: 1 }));
        assert_eq!(model.len(), 2);
        assert_eq!(model.config(1).unwrap().actuator_type, ActuatorType::Type01);
    }

    #[test]
    fn test_update_from_feedback_sets_online() {
        let mut model = model();
        assert!(!model.state(1).unwrap().online);

        assert!(model.update_from_feedback(1, &feedback(1, 0.5), 100).unwrap());
        let state = model.state(1).unwrap();
        assert!(state.online);
        assert_eq!(state.position, 0.5);
        assert_eq!(state.temperature, 31.5);
        assert_eq!(state.mode, MotorMode::Run);
        assert_eq!(state.messages_received, 1);
        assert_eq!(state.last_feedback_us, Some(100));

        // 已在线时不再报告状态迁移
        assert!(!model.update_from_feedback(1, &feedback(1, 0.6), 200).unwrap());
        assert_eq!(model.state(1).unwrap().messages_received, 2);
    }

    #[test]
    fn test_update_unknown_actuator() {
        let mut model = model();
        let err = model
            .update_from_feedback(9, &feedback(9, 0.0), 0)
            .unwrap_err();
        assert!(matches!(err, DriverError::UnknownActuator { id: 9 }));
    }

    #[test]
    fn test_feedback_values_not_clamped() {
        let mut model = model();
        // 超出型号位置区间的值按原样保存
        model.update_from_feedback(1, &feedback(1, 40.0), 0).unwrap();
        assert_eq!(model.state(1).unwrap().position, 40.0);
    }

    #[test]
    fn test_snapshot_order_and_placeholders() {
        let mut model = model();
        model.update_from_feedback(2, &feedback(2, 1.0), 0).unwrap();

        let snap = model.snapshot(&[2, 42, 1]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].actuator_id, 2);
        assert!(snap[0].online);
        assert_eq!(snap[1], ActuatorState::offline(42));
        assert_eq!(snap[2].actuator_id, 1);
        assert!(!snap[2].online);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut model = model();
        model.update_from_feedback(1, &feedback(1, 1.0), 0).unwrap();
        let before = model.snapshot(&[1]);
        model.update_from_feedback(1, &feedback(1, 2.0), 1).unwrap();
        assert_eq!(before[0].position, 1.0);
        assert_eq!(model.snapshot(&[1])[0].position, 2.0);
    }

    #[test]
    fn test_mark_offline_and_reset() {
        let mut model = model();
        model.update_from_feedback(1, &feedback(1, 1.0), 0).unwrap();
        assert!(model.mark_offline(1));
        assert!(!model.mark_offline(1));
        assert!(!model.mark_offline(77));

        model.update_from_feedback(1, &feedback(1, 1.0), 0).unwrap();
        model.reset(1).unwrap();
        assert_eq!(model.state(1).unwrap(), &ActuatorState::offline(1));
        assert!(matches!(
            model.reset(77),
            Err(DriverError::UnknownActuator { id: 77 })
        ));
    }

    #[test]
    fn test_record_fault() {
        let mut model = model();
        let report = FaultReport {
            actuator_id: 2,
            fault_bits: 1 << 14,
            warning_bits: 0,
        };
        model.record_fault(report).unwrap();
        assert_eq!(model.state(2).unwrap().fault_report, Some(report));
        assert!(
            model
                .record_fault(FaultReport {
                    actuator_id: 5,
                    ..report
                })
                .is_err()
        );
    }

    #[test]
    fn test_torque_limit_never_exceeds_type() {
        let cfg = ControlConfig {
            max_torque: Some(500.0),
            ..Default::default()
        };
        assert_eq!(cfg.torque_limit(ActuatorType::Type01), 12.0);

        let cfg = ControlConfig {
            max_torque: Some(-5.0),
            ..Default::default()
        };
        assert_eq!(cfg.torque_limit(ActuatorType::Type01), 5.0);
        assert_eq!(
            ControlConfig::default().torque_limit(ActuatorType::Type03),
            60.0
        );
    }
}
