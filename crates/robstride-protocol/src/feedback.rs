//! 反馈帧解析（执行器 -> 主机）
//!
//! 执行器发出的所有响应帧，仲裁 ID 的 data_field 低 8 位都是源执行器 ID，
//! destination 字节为主机 ID。解码分两步：先用 [`source_id`] 找到执行器，
//! 再用该执行器的型号配置调用 [`Response::decode`]。

use crate::codec::{PhysicalRange, decode, encode};
use crate::control::{expect_command, expect_len};
use crate::ids::CommandType;
use crate::types::ActuatorTypeConfig;
use crate::{Frame, ProtocolError, bytes_to_u16_be, bytes_to_u32_le, u16_to_bytes_be};
use bilge::prelude::*;

/// 反馈帧中温度的单位（0.1 °C）
pub const TEMPERATURE_SCALE: f64 = 10.0;

/// 故障位（反馈帧 data_field bit 8-13）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct FaultFlags {
    pub undervoltage: bool,     // Bit 0: 欠压
    pub overcurrent: bool,      // Bit 1: 过流
    pub over_temperature: bool, // Bit 2: 过温
    pub magnetic_encoder: bool, // Bit 3: 磁编码故障
    pub hall_encoder: bool,     // Bit 4: HALL 编码故障
    pub uncalibrated: bool,     // Bit 5: 未标定
    pub reserved: u2,           // Bit 6-7: 模式（不在此结构中解释）
}

impl FaultFlags {
    /// 只保留 6 个故障位
    pub fn from_bits_masked(bits: u8) -> Self {
        FaultFlags::from(u8::new(bits & 0x3F))
    }

    pub fn bits(self) -> u8 {
        u8::from(self).value()
    }

    pub fn any(self) -> bool {
        self.bits() & 0x3F != 0
    }
}

// bilge 生成的结构体没有 serde 派生，按原始字节序列化
#[cfg(feature = "serde")]
impl serde::Serialize for FaultFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FaultFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = <u8 as serde::Deserialize>::deserialize(deserializer)?;
        Ok(FaultFlags::from_bits_masked(bits))
    }
}

/// 执行器模式（反馈帧 data_field bit 14-15）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotorMode {
    /// 复位模式（未使能）
    #[default]
    Reset = 0,
    /// 标定模式
    Calibration = 1,
    /// 运行模式
    Run = 2,
    /// 保留值
    Unknown = 3,
}

/// 电机反馈（通信类型 2）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feedback {
    pub actuator_id: u8,
    pub host_id: u8,
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    /// 摄氏度
    pub temperature: f64,
    pub mode: MotorMode,
    pub faults: FaultFlags,
}

impl Feedback {
    /// 解码反馈帧；数值字段不钳位
    pub fn decode(frame: &Frame, cfg: &ActuatorTypeConfig) -> Result<Self, ProtocolError> {
        let id = expect_command(frame, CommandType::Feedback)?;
        if frame.len != 8 {
            return Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: frame.len as usize,
            });
        }

        let d = &frame.data;
        let status = id.data_high();
        Ok(Self {
            actuator_id: id.data_low(),
            host_id: id.destination,
            position: decode(bytes_to_u16_be([d[0], d[1]]), cfg.position),
            velocity: decode(bytes_to_u16_be([d[2], d[3]]), cfg.velocity),
            torque: decode(bytes_to_u16_be([d[4], d[5]]), cfg.torque),
            temperature: bytes_to_u16_be([d[6], d[7]]) as f64 / TEMPERATURE_SCALE,
            mode: MotorMode::from(status >> 6),
            faults: FaultFlags::from_bits_masked(status),
        })
    }

    /// 编码为反馈帧（仿真端使用）
    pub fn to_frame(&self, cfg: &ActuatorTypeConfig) -> Frame {
        let status = ((self.mode as u8) << 6) | (self.faults.bits() & 0x3F);
        let data_field = ((status as u16) << 8) | self.actuator_id as u16;

        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&u16_to_bytes_be(encode(self.position, cfg.position)));
        data[2..4].copy_from_slice(&u16_to_bytes_be(encode(self.velocity, cfg.velocity)));
        data[4..6].copy_from_slice(&u16_to_bytes_be(encode(self.torque, cfg.torque)));
        let temp_raw = encode_temperature(self.temperature);
        data[6..8].copy_from_slice(&u16_to_bytes_be(temp_raw));

        Frame::new(CommandType::Feedback.arbitration_id(data_field, self.host_id), &data)
    }
}

fn encode_temperature(celsius: f64) -> u16 {
    let range = PhysicalRange::new(0.0, u16::MAX as f64 / TEMPERATURE_SCALE);
    (range.clamp(celsius) * TEMPERATURE_SCALE).round() as u16
}

/// 故障上报（通信类型 21），故障字和告警字均为小端 u32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultReport {
    pub actuator_id: u8,
    pub fault_bits: u32,
    pub warning_bits: u32,
}

impl FaultReport {
    pub fn motor_over_temperature(&self) -> bool {
        self.fault_bits & 1 != 0
    }
    pub fn driver_chip_failure(&self) -> bool {
        self.fault_bits & (1 << 1) != 0
    }
    pub fn undervoltage(&self) -> bool {
        self.fault_bits & (1 << 2) != 0
    }
    pub fn overvoltage(&self) -> bool {
        self.fault_bits & (1 << 3) != 0
    }
    pub fn encoder_not_calibrated(&self) -> bool {
        self.fault_bits & (1 << 7) != 0
    }
    pub fn phase_b_overcurrent(&self) -> bool {
        self.fault_bits & (1 << 11) != 0
    }
    pub fn phase_c_overcurrent(&self) -> bool {
        self.fault_bits & (1 << 12) != 0
    }
    pub fn phase_a_overcurrent(&self) -> bool {
        self.fault_bits & (1 << 13) != 0
    }
    pub fn overload(&self) -> bool {
        self.fault_bits & (1 << 14) != 0
    }
    pub fn over_temperature_warning(&self) -> bool {
        self.warning_bits & 1 != 0
    }

    pub fn has_fault(&self) -> bool {
        self.fault_bits != 0
    }
}

impl TryFrom<Frame> for FaultReport {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let id = expect_command(&frame, CommandType::Fault)?;
        expect_len(&frame, 8)?;
        let d = frame.data;
        Ok(Self {
            actuator_id: id.data_low(),
            fault_bits: bytes_to_u32_le([d[0], d[1], d[2], d[3]]),
            warning_bits: bytes_to_u32_le([d[4], d[5], d[6], d[7]]),
        })
    }
}

/// 参数读取响应（通信类型 17）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamValue {
    pub actuator_id: u8,
    pub index: u16,
    /// data[4..8] 的小端原始值
    pub raw: u32,
}

impl ParamValue {
    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.raw)
    }

    pub fn as_u8(&self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// 编码为读取响应帧（仿真端使用）
    pub fn to_frame(&self, host_id: u8) -> Frame {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&self.index.to_le_bytes());
        data[4..8].copy_from_slice(&self.raw.to_le_bytes());
        Frame::new(
            CommandType::Read.arbitration_id(self.actuator_id as u16, host_id),
            &data,
        )
    }
}

impl TryFrom<Frame> for ParamValue {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let id = expect_command(&frame, CommandType::Read)?;
        expect_len(&frame, 8)?;
        let d = frame.data;
        Ok(Self {
            actuator_id: id.data_low(),
            index: u16::from_le_bytes([d[0], d[1]]),
            raw: bytes_to_u32_le([d[4], d[5], d[6], d[7]]),
        })
    }
}

/// 设备 ID 响应（通信类型 0），数据区为 64 位唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdResponse {
    pub actuator_id: u8,
    pub uid: [u8; 8],
}

impl DeviceIdResponse {
    pub fn to_frame(&self, host_id: u8) -> Frame {
        Frame::new(
            CommandType::ObtainId.arbitration_id(self.actuator_id as u16, host_id),
            &self.uid,
        )
    }
}

impl TryFrom<Frame> for DeviceIdResponse {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let id = expect_command(&frame, CommandType::ObtainId)?;
        expect_len(&frame, 8)?;
        Ok(Self {
            actuator_id: id.data_low(),
            uid: frame.data,
        })
    }
}

/// 执行器发往主机的帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    Feedback(Feedback),
    Fault(FaultReport),
    Param(ParamValue),
    DeviceId(DeviceIdResponse),
}

impl Response {
    pub fn actuator_id(&self) -> u8 {
        match self {
            Response::Feedback(f) => f.actuator_id,
            Response::Fault(f) => f.actuator_id,
            Response::Param(p) => p.actuator_id,
            Response::DeviceId(d) => d.actuator_id,
        }
    }

    /// 解码响应帧；`cfg` 为源执行器的型号配置（只有反馈帧用到）
    pub fn decode(frame: &Frame, cfg: &ActuatorTypeConfig) -> Result<Self, ProtocolError> {
        let command = frame.arbitration_id()?.command()?;
        match command {
            CommandType::Feedback => Feedback::decode(frame, cfg).map(Response::Feedback),
            CommandType::Fault => FaultReport::try_from(*frame).map(Response::Fault),
            CommandType::Read => ParamValue::try_from(*frame).map(Response::Param),
            CommandType::ObtainId => DeviceIdResponse::try_from(*frame).map(Response::DeviceId),
            other => Err(ProtocolError::ParseError(format!(
                "{other:?} is not an actuator response"
            ))),
        }
    }
}

/// 响应帧的源执行器 ID（data_field 低 8 位）
pub fn source_id(frame: &Frame) -> Result<u8, ProtocolError> {
    Ok(frame.arbitration_id()?.data_low())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActuatorType;

    fn type01() -> &'static ActuatorTypeConfig {
        ActuatorType::Type01.config()
    }

    fn sample() -> Feedback {
        Feedback {
            actuator_id: 3,
            host_id: 0,
            position: 1.0,
            velocity: -0.5,
            torque: 2.0,
            temperature: 36.7,
            mode: MotorMode::Run,
            faults: FaultFlags::default(),
        }
    }

    #[test]
    fn test_feedback_decode_fields() {
        let frame = sample().to_frame(type01());
        let fb = Feedback::decode(&frame, type01()).unwrap();
        assert_eq!(fb.actuator_id, 3);
        assert_eq!(fb.mode, MotorMode::Run);
        assert!(!fb.faults.any());
        assert!((fb.position - 1.0).abs() <= type01().position.resolution());
        assert!((fb.velocity + 0.5).abs() <= type01().velocity.resolution());
        assert!((fb.torque - 2.0).abs() <= type01().torque.resolution());
        assert!((fb.temperature - 36.7).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_status_bits() {
        // mode=2 (Run), 过流 + 未标定
        let status: u8 = (2 << 6) | 0b10_0010;
        let id = (2u32 << 24) | ((status as u32) << 16) | (5 << 8);
        let frame = Frame::new(id, &[0x80, 0, 0x80, 0, 0x80, 0, 0x01, 0x2C]);
        let fb = Feedback::decode(&frame, type01()).unwrap();
        assert_eq!(fb.actuator_id, 5);
        assert_eq!(fb.mode, MotorMode::Run);
        assert!(fb.faults.overcurrent());
        assert!(fb.faults.uncalibrated());
        assert!(!fb.faults.undervoltage());
        assert_eq!(fb.temperature, 30.0);
    }

    #[test]
    fn test_feedback_short_frame_rejected() {
        let frame = Frame::new(2 << 24 | 1 << 8, &[0; 5]);
        assert_eq!(
            Feedback::decode(&frame, type01()),
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 5
            })
        );
    }

    #[test]
    fn test_feedback_wrong_type_rejected() {
        let frame = Frame::new(1 << 24, &[0; 8]);
        assert!(matches!(
            Feedback::decode(&frame, type01()),
            Err(ProtocolError::UnexpectedCommand {
                expected: CommandType::Feedback,
                actual: CommandType::Control
            })
        ));
    }

    #[test]
    fn test_fault_report_bits() {
        let fault: u32 = (1 << 13) | (1 << 2) | 1;
        let mut data = [0u8; 8];
        data[0..4].copy_from_slice(&fault.to_le_bytes());
        data[4..8].copy_from_slice(&1u32.to_le_bytes());
        let frame = Frame::new((21 << 24) | (4 << 8), &data);

        let report = FaultReport::try_from(frame).unwrap();
        assert_eq!(report.actuator_id, 4);
        assert!(report.phase_a_overcurrent());
        assert!(report.undervoltage());
        assert!(report.motor_over_temperature());
        assert!(!report.overload());
        assert!(report.over_temperature_warning());
        assert!(report.has_fault());
    }

    #[test]
    fn test_param_value_roundtrip() {
        let value = ParamValue {
            actuator_id: 2,
            index: 0x7005,
            raw: 1.25f32.to_bits(),
        };
        let frame = value.to_frame(0);
        let back = ParamValue::try_from(frame).unwrap();
        assert_eq!(back, value);
        assert_eq!(back.as_f32(), 1.25);
    }

    #[test]
    fn test_response_dispatch() {
        let cfg = type01();
        let resp = Response::decode(&sample().to_frame(cfg), cfg).unwrap();
        assert!(matches!(resp, Response::Feedback(_)));
        assert_eq!(resp.actuator_id(), 3);

        let dev = DeviceIdResponse {
            actuator_id: 9,
            uid: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let frame = dev.to_frame(0);
        assert_eq!(source_id(&frame).unwrap(), 9);
        assert_eq!(Response::decode(&frame, cfg).unwrap(), Response::DeviceId(dev));
    }

    #[test]
    fn test_response_rejects_host_commands() {
        let frame = Frame::new(3 << 24, &[0; 8]);
        assert!(matches!(
            Response::decode(&frame, type01()),
            Err(ProtocolError::ParseError(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_feedback_types_are_serde() {
        fn assert_serde<T: serde::Serialize + serde::de::DeserializeOwned>() {}
        assert_serde::<Feedback>();
        assert_serde::<FaultFlags>();
        assert_serde::<FaultReport>();
        assert_serde::<MotorMode>();
    }
}
