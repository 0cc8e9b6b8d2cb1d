//! 仿真 transport
//!
//! 不接触硬件，由内部的 plant 模型合成响应帧：
//! 运控帧的位置/速度/力矩被原样回显为反馈（零动力学），
//! 使能、停止、置零、参数读写、改 ID、获取设备 ID 都有对应的响应。
//!
//! 所有响应在 `send` 时同步生成并进入接收队列，`recv` 从不等待，
//! 因此基于仿真的测试是完全确定的。
//!
//! ```
//! use robstride_can::{SimTransport, Transport};
//! use robstride_protocol::{ActuatorType, Command};
//! use std::time::Duration;
//!
//! let mut sim = SimTransport::new(&[(1, ActuatorType::Type01)]);
//! let cfg = ActuatorType::Type01.config();
//! sim.send(Command::Enable.to_frame(1, 0, cfg)).unwrap();
//! assert!(sim.recv(Duration::from_millis(1)).unwrap().is_some());
//! ```

use crate::{Frame, Transport, TransportError};
use parking_lot::Mutex;
use robstride_protocol::{
    ActuatorType, Command, DeviceIdResponse, FaultFlags, Feedback, MotorMode, ParamValue,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// 仿真执行器的状态
#[derive(Debug, Clone, PartialEq)]
pub struct SimActuator {
    pub actuator_type: ActuatorType,
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    pub temperature: f64,
    pub mode: MotorMode,
    pub faults: FaultFlags,
    pub params: HashMap<u16, u32>,
    /// 静默时不响应任何帧（模拟掉线）
    pub silent: bool,
    pub uid: [u8; 8],
}

impl SimActuator {
    fn new(id: u8, actuator_type: ActuatorType) -> Self {
        Self {
            actuator_type,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
            temperature: 25.0,
            mode: MotorMode::Reset,
            faults: FaultFlags::default(),
            params: HashMap::new(),
            silent: false,
            uid: [0x52, 0x53, 0, 0, 0, 0, 0, id],
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    actuators: HashMap<u8, SimActuator>,
    /// 执行器 -> 主机
    rx_queue: VecDeque<Frame>,
    /// 主机 -> 执行器（全部记录，供测试检查）
    sent: Vec<Frame>,
    fail_sends: usize,
    closed: bool,
    host_id: u8,
}

impl SimState {
    fn respond(&mut self, frame: Frame) {
        let Ok(id) = frame.arbitration_id() else {
            return;
        };
        let dest = id.destination;
        let host_id = self.host_id;

        let Some(act) = self.actuators.get_mut(&dest) else {
            trace!("sim: no actuator at 0x{:02X}", dest);
            return;
        };
        if act.silent {
            return;
        }

        let cfg = act.actuator_type.config();
        let command = match Command::from_frame(&frame, cfg) {
            Ok(command) => command,
            Err(e) => {
                trace!("sim: ignoring frame 0x{:08X}: {}", frame.id, e);
                return;
            },
        };

        let reply = match command {
            Command::Motion(cmd) => {
                act.position = cfg.position.clamp(cmd.position);
                act.velocity = cfg.velocity.clamp(cmd.velocity);
                act.torque = cfg.torque.clamp(cmd.torque);
                Some(feedback_frame(dest, host_id, act))
            },
            Command::RequestFeedback => Some(feedback_frame(dest, host_id, act)),
            Command::Enable => {
                act.mode = MotorMode::Run;
                Some(feedback_frame(dest, host_id, act))
            },
            Command::Stop { clear_fault } => {
                act.mode = MotorMode::Reset;
                act.velocity = 0.0;
                act.torque = 0.0;
                if clear_fault {
                    act.faults = FaultFlags::default();
                }
                Some(feedback_frame(dest, host_id, act))
            },
            Command::SetZero => {
                act.position = 0.0;
                Some(feedback_frame(dest, host_id, act))
            },
            Command::RequestDeviceId => Some(
                DeviceIdResponse {
                    actuator_id: dest,
                    uid: act.uid,
                }
                .to_frame(host_id),
            ),
            Command::RequestParam { index } => Some(
                ParamValue {
                    actuator_id: dest,
                    index,
                    raw: act.params.get(&index).copied().unwrap_or(0),
                }
                .to_frame(host_id),
            ),
            Command::WriteParam { index, value } => {
                act.params.insert(index, value);
                None
            },
            Command::SetDeviceId { new_id } => {
                if let Some(mut moved) = self.actuators.remove(&dest) {
                    moved.uid[7] = new_id;
                    let reply = DeviceIdResponse {
                        actuator_id: new_id,
                        uid: moved.uid,
                    }
                    .to_frame(host_id);
                    self.actuators.insert(new_id, moved);
                    self.rx_queue.push_back(reply);
                }
                None
            },
        };

        if let Some(reply) = reply {
            self.rx_queue.push_back(reply);
        }
    }
}

fn feedback_frame(id: u8, host_id: u8, act: &SimActuator) -> Frame {
    Feedback {
        actuator_id: id,
        host_id,
        position: act.position,
        velocity: act.velocity,
        torque: act.torque,
        temperature: act.temperature,
        mode: act.mode,
        faults: act.faults,
    }
    .to_frame(act.actuator_type.config())
}

/// 仿真 transport
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
    name: String,
}

impl SimTransport {
    /// 创建仿真总线，`actuators` 为挂在总线上的 `(id, 型号)`
    pub fn new(actuators: &[(u8, ActuatorType)]) -> Self {
        let state = SimState {
            actuators: actuators
                .iter()
                .map(|&(id, ty)| (id, SimActuator::new(id, ty)))
                .collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            name: "sim".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 响应帧的目标主机 ID
    pub fn with_host_id(self, host_id: u8) -> Self {
        self.state.lock().host_id = host_id;
        self
    }

    /// 测试/诊断句柄，与 transport 共享状态
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }
}

impl Transport for SimTransport {
    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(TransportError::Io(std::io::Error::other(
                "simulated send failure",
            )));
        }
        trace!("sim[{}] <- 0x{:08X} {:02X?}", self.name, frame.id, frame.data_slice());
        state.sent.push(frame);
        state.respond(frame);
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        Ok(state.rx_queue.pop_front())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 仿真总线的共享句柄
///
/// transport 被 Supervisor 拿走之后，测试通过它检查已发送的帧、注入帧和故障。
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// 已发送的帧（按发送顺序）
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state.lock().sent.clone()
    }

    /// 取出并清空已发送的帧
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// 向接收队列注入一帧（如畸形帧）
    pub fn inject(&self, frame: Frame) {
        self.state.lock().rx_queue.push_back(frame);
    }

    /// 接收队列中尚未被读取的帧数
    pub fn pending_rx(&self) -> usize {
        self.state.lock().rx_queue.len()
    }

    /// 接下来 `count` 次 `send` 返回错误
    pub fn fail_next_sends(&self, count: usize) {
        self.state.lock().fail_sends = count;
    }

    /// 让执行器停止响应（模拟掉线）或恢复
    pub fn set_silent(&self, id: u8, silent: bool) {
        if let Some(act) = self.state.lock().actuators.get_mut(&id) {
            act.silent = silent;
        }
    }

    pub fn set_faults(&self, id: u8, faults: FaultFlags) {
        if let Some(act) = self.state.lock().actuators.get_mut(&id) {
            act.faults = faults;
        }
    }

    pub fn set_temperature(&self, id: u8, celsius: f64) {
        if let Some(act) = self.state.lock().actuators.get_mut(&id) {
            act.temperature = celsius;
        }
    }

    pub fn actuator(&self, id: u8) -> Option<SimActuator> {
        self.state.lock().actuators.get(&id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robstride_protocol::{ControlCommand, Response};

    const T: Duration = Duration::from_millis(1);

    fn decode(frame: &Frame) -> Response {
        Response::decode(frame, ActuatorType::Type01.config()).unwrap()
    }

    #[test]
    fn test_motion_is_echoed_as_feedback() {
        let mut sim = SimTransport::new(&[(1, ActuatorType::Type01)]);
        let cfg = ActuatorType::Type01.config();
        let cmd = ControlCommand::new(1.0, 0.5, 2.0, 10.0, 1.0);
        sim.send(cmd.to_frame(1, cfg)).unwrap();

        let frame = sim.recv(T).unwrap().unwrap();
        let Response::Feedback(fb) = decode(&frame) else {
            panic!("expected feedback");
        };
        assert_eq!(fb.actuator_id, 1);
        assert!((fb.position - 1.0).abs() <= 2.0 * cfg.position.resolution());
        assert!((fb.velocity - 0.5).abs() <= 2.0 * cfg.velocity.resolution());
        assert!((fb.torque - 2.0).abs() <= 2.0 * cfg.torque.resolution());
        assert!(sim.recv(T).unwrap().is_none());
    }

    #[test]
    fn test_unknown_destination_is_ignored() {
        let mut sim = SimTransport::new(&[(1, ActuatorType::Type01)]);
        let cfg = ActuatorType::Type01.config();
        sim.send(Command::Enable.to_frame(2, 0, cfg)).unwrap();
        assert!(sim.recv(T).unwrap().is_none());
        assert_eq!(sim.handle().sent_frames().len(), 1);
    }

    #[test]
    fn test_enable_and_stop_change_mode() {
        let mut sim = SimTransport::new(&[(1, ActuatorType::Type01)]);
        let cfg = ActuatorType::Type01.config();

        sim.send(Command::Enable.to_frame(1, 0, cfg)).unwrap();
        let Response::Feedback(fb) = decode(&sim.recv(T).unwrap().unwrap()) else {
            panic!("expected feedback");
        };
        assert_eq!(fb.mode, MotorMode::Run);

        sim.send(Command::Stop { clear_fault: false }.to_frame(1, 0, cfg))
            .unwrap();
        let Response::Feedback(fb) = decode(&sim.recv(T).unwrap().unwrap()) else {
            panic!("expected feedback");
        };
        assert_eq!(fb.mode, MotorMode::Reset);
    }

    #[test]
    fn test_param_write_then_read() {
        let mut sim = SimTransport::new(&[(4, ActuatorType::Type04)]);
        let cfg = ActuatorType::Type04.config();
        sim.send(Command::write_param_f32(0x700B, 7.5).to_frame(4, 0, cfg))
            .unwrap();
        assert!(sim.recv(T).unwrap().is_none());

        sim.send(Command::RequestParam { index: 0x700B }.to_frame(4, 0, cfg))
            .unwrap();
        let frame = sim.recv(T).unwrap().unwrap();
        let Response::Param(p) = Response::decode(&frame, cfg).unwrap() else {
            panic!("expected param response");
        };
        assert_eq!(p.actuator_id, 4);
        assert_eq!(p.as_f32(), 7.5);
    }

    #[test]
    fn test_set_device_id_moves_actuator() {
        let mut sim = SimTransport::new(&[(1, ActuatorType::Type02)]);
        let handle = sim.handle();
        let cfg = ActuatorType::Type02.config();
        sim.send(Command::SetDeviceId { new_id: 7 }.to_frame(1, 0, cfg))
            .unwrap();

        let frame = sim.recv(T).unwrap().unwrap();
        assert_eq!(robstride_protocol::source_id(&frame).unwrap(), 7);
        assert!(handle.actuator(1).is_none());
        assert!(handle.actuator(7).is_some());
    }

    #[test]
    fn test_injected_failures_and_silence() {
        let mut sim = SimTransport::new(&[(1, ActuatorType::Type01)]);
        let handle = sim.handle();
        let cfg = ActuatorType::Type01.config();

        handle.fail_next_sends(1);
        assert!(sim.send(Command::Enable.to_frame(1, 0, cfg)).is_err());
        assert!(sim.send(Command::Enable.to_frame(1, 0, cfg)).is_ok());
        assert!(sim.recv(T).unwrap().is_some());

        handle.set_silent(1, true);
        sim.send(Command::RequestFeedback.to_frame(1, 0, cfg)).unwrap();
        assert!(sim.recv(T).unwrap().is_none());

        handle.inject(Frame::new(2 << 24 | 1 << 8, &[0; 5]));
        assert_eq!(sim.recv(T).unwrap().unwrap().len, 5);
    }

    #[test]
    fn test_close_rejects_io() {
        let mut sim = SimTransport::new(&[]);
        let handle = sim.handle();
        sim.close().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            sim.send(Frame::new(0, &[])),
            Err(TransportError::Closed)
        ));
        assert!(matches!(sim.recv(T), Err(TransportError::Closed)));
    }
}
