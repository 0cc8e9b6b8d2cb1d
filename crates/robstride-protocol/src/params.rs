//! 参数索引（通信类型 17/18 使用）

/// 运行模式：0 运控，1 位置，2 速度，3 电流
pub const RUN_MODE: u16 = 0x7005;
/// 电流模式 Iq 指令
pub const IQ_REF: u16 = 0x7006;
/// 转速模式转速指令
pub const SPEED_REF: u16 = 0x700A;
/// 转矩限制
pub const LIMIT_TORQUE: u16 = 0x700B;
/// 位置模式角度指令
pub const LOC_REF: u16 = 0x7016;
/// 位置模式速度限制
pub const LIMIT_SPD: u16 = 0x7017;
/// 速度/位置模式电流限制
pub const LIMIT_CUR: u16 = 0x7018;

/// CAN 超时（型号 02/03/04）
pub const CAN_TIMEOUT: u16 = 0x200B;
/// CAN 超时（型号 01）
pub const CAN_TIMEOUT_TYPE01: u16 = 0x200C;

/// 运行模式取值
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum RunMode {
    Motion = 0,
    Position = 1,
    Speed = 2,
    Current = 3,
}
