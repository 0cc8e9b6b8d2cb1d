//! 控制帧构建（主机 -> 执行器）
//!
//! 所有指令帧都以 8 字节发送，未使用的字节补 0。
//! 仲裁 ID 的 data_field 低 8 位携带主机 ID（默认 0）。

use crate::codec::{decode, encode};
use crate::ids::{ArbitrationId, CommandType};
use crate::params::{self, RunMode};
use crate::types::{ActuatorType, ActuatorTypeConfig};
use crate::{Frame, ProtocolError, bytes_to_u16_be, bytes_to_u32_le, u16_to_bytes_be};

/// 运控指令：期望的 `{position, velocity, torque, kp, kd}`
///
/// 单位：rad、rad/s、N·m，kp/kd 为无量纲增益。
/// 编码时各量按型号区间钳位，这里不做校验。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlCommand {
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    pub kp: f64,
    pub kd: f64,
}

impl ControlCommand {
    pub fn new(position: f64, velocity: f64, torque: f64, kp: f64, kd: f64) -> Self {
        Self {
            position,
            velocity,
            torque,
            kp,
            kd,
        }
    }

    /// 力矩钳位到 `[-max_torque, max_torque]`
    pub fn with_torque_limit(mut self, max_torque: f64) -> Self {
        let limit = max_torque.abs();
        self.torque = if self.torque.is_nan() {
            0.0
        } else {
            self.torque.clamp(-limit, limit)
        };
        self
    }

    /// 构建运控帧（通信类型 1）
    ///
    /// 力矩放在仲裁 ID 的 data_field，数据区依次为角度、速度、Kp、Kd（大端 u16）。
    pub fn to_frame(&self, destination: u8, cfg: &ActuatorTypeConfig) -> Frame {
        let torque_raw = encode(self.torque, cfg.torque);

        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&u16_to_bytes_be(encode(self.position, cfg.position)));
        data[2..4].copy_from_slice(&u16_to_bytes_be(encode(self.velocity, cfg.velocity)));
        data[4..6].copy_from_slice(&u16_to_bytes_be(encode(self.kp, cfg.kp)));
        data[6..8].copy_from_slice(&u16_to_bytes_be(encode(self.kd, cfg.kd)));

        Frame::new(CommandType::Control.arbitration_id(torque_raw, destination), &data)
    }

    /// 解析运控帧（仿真端使用）
    pub fn from_frame(frame: &Frame, cfg: &ActuatorTypeConfig) -> Result<Self, ProtocolError> {
        let id = expect_command(frame, CommandType::Control)?;
        expect_len(frame, 8)?;

        let d = &frame.data;
        Ok(Self {
            position: decode(bytes_to_u16_be([d[0], d[1]]), cfg.position),
            velocity: decode(bytes_to_u16_be([d[2], d[3]]), cfg.velocity),
            torque: decode(id.data_field, cfg.torque),
            kp: decode(bytes_to_u16_be([d[4], d[5]]), cfg.kp),
            kd: decode(bytes_to_u16_be([d[6], d[7]]), cfg.kd),
        })
    }
}

/// 主机 -> 执行器的指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// 获取设备 ID（类型 0）
    RequestDeviceId,
    /// 运控指令（类型 1）
    Motion(ControlCommand),
    /// 请求一帧反馈，不改变运动状态（类型 2）
    RequestFeedback,
    /// 使能（类型 3）
    Enable,
    /// 停止（类型 4），`clear_fault` 时同时清除故障
    Stop { clear_fault: bool },
    /// 将当前位置设为机械零位（类型 6）
    SetZero,
    /// 修改 CAN ID（类型 7）
    SetDeviceId { new_id: u8 },
    /// 读取参数（类型 17）
    RequestParam { index: u16 },
    /// 写入参数（类型 18），数值为 4 字节小端原始值
    WriteParam { index: u16, value: u32 },
}

impl Command {
    /// 写入 f32 类型参数
    pub fn write_param_f32(index: u16, value: f32) -> Self {
        Command::WriteParam {
            index,
            value: value.to_bits(),
        }
    }

    /// 切换运行模式
    pub fn set_run_mode(mode: RunMode) -> Self {
        Command::WriteParam {
            index: params::RUN_MODE,
            value: u8::from(mode) as u32,
        }
    }

    /// 写入 CAN 超时（秒），按型号的超时系数换算
    pub fn set_can_timeout(actuator_type: ActuatorType, seconds: f64) -> Self {
        Command::WriteParam {
            index: actuator_type.config().timeout_command_code,
            value: actuator_type.timeout_raw(seconds),
        }
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            Command::RequestDeviceId => CommandType::ObtainId,
            Command::Motion(_) => CommandType::Control,
            Command::RequestFeedback => CommandType::Feedback,
            Command::Enable => CommandType::Enable,
            Command::Stop { .. } => CommandType::Stop,
            Command::SetZero => CommandType::SetZero,
            Command::SetDeviceId { .. } => CommandType::SetId,
            Command::RequestParam { .. } => CommandType::Read,
            Command::WriteParam { .. } => CommandType::Write,
        }
    }

    /// 编码为线上帧
    pub fn to_frame(&self, destination: u8, host_id: u8, cfg: &ActuatorTypeConfig) -> Frame {
        let host = host_id as u16;
        let mut data = [0u8; 8];
        let data_field = match *self {
            Command::Motion(cmd) => return cmd.to_frame(destination, cfg),
            Command::RequestDeviceId
            | Command::RequestFeedback
            | Command::Enable => host,
            Command::Stop { clear_fault } => {
                data[0] = clear_fault as u8;
                host
            },
            Command::SetZero => {
                data[0] = 1;
                host
            },
            Command::SetDeviceId { new_id } => {
                data[0] = 1;
                ((new_id as u16) << 8) | host
            },
            Command::RequestParam { index } => {
                data[0..2].copy_from_slice(&index.to_le_bytes());
                host
            },
            Command::WriteParam { index, value } => {
                data[0..2].copy_from_slice(&index.to_le_bytes());
                data[4..8].copy_from_slice(&value.to_le_bytes());
                host
            },
        };
        Frame::new(self.command_type().arbitration_id(data_field, destination), &data)
    }

    /// 解析指令帧（仿真端使用），运控帧需要型号配置才能解码
    pub fn from_frame(frame: &Frame, cfg: &ActuatorTypeConfig) -> Result<Self, ProtocolError> {
        let id = frame.arbitration_id()?;
        let d = &frame.data;
        let cmd = match id.command()? {
            CommandType::Control => Command::Motion(ControlCommand::from_frame(frame, cfg)?),
            CommandType::ObtainId => Command::RequestDeviceId,
            CommandType::Feedback => Command::RequestFeedback,
            CommandType::Enable => Command::Enable,
            CommandType::Stop => Command::Stop {
                clear_fault: frame.len > 0 && d[0] == 1,
            },
            CommandType::SetZero => Command::SetZero,
            CommandType::SetId => Command::SetDeviceId {
                new_id: id.data_high(),
            },
            CommandType::Read => {
                expect_len(frame, 2)?;
                Command::RequestParam {
                    index: u16::from_le_bytes([d[0], d[1]]),
                }
            },
            CommandType::Write => {
                expect_len(frame, 8)?;
                Command::WriteParam {
                    index: u16::from_le_bytes([d[0], d[1]]),
                    value: bytes_to_u32_le([d[4], d[5], d[6], d[7]]),
                }
            },
            other => {
                return Err(ProtocolError::ParseError(format!(
                    "{other:?} is not a host command"
                )));
            },
        };
        Ok(cmd)
    }
}

pub(crate) fn expect_command(
    frame: &Frame,
    expected: CommandType,
) -> Result<ArbitrationId, ProtocolError> {
    let id = frame.arbitration_id()?;
    let actual = id.command()?;
    if actual != expected {
        return Err(ProtocolError::UnexpectedCommand { expected, actual });
    }
    Ok(id)
}

/// 长度不足即为畸形帧
pub(crate) fn expect_len(frame: &Frame, expected: usize) -> Result<(), ProtocolError> {
    if (frame.len as usize) < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: frame.len as usize,
        });
    }
    Ok(())
}
