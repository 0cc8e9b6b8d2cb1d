//! 仲裁 ID 布局与通信类型
//!
//! ```text
//! bit 28..24   bit 23..8        bit 7..0
//! comm_type    data_field(16)   destination
//! ```

use crate::{EXTENDED_ID_MASK, ProtocolError};

/// 广播/主机默认 ID
pub const DEFAULT_HOST_ID: u8 = 0x00;

/// 扫描时探测的最大执行器 ID（0xFF 保留）
pub const MAX_ACTUATOR_ID: u8 = 0xFE;

/// 通信类型（仲裁 ID 的 bit 24-28）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandType {
    /// 获取设备 ID（及 64 位唯一标识）
    ObtainId = 0,
    /// 运控模式控制指令
    Control = 1,
    /// 电机反馈
    Feedback = 2,
    /// 使能
    Enable = 3,
    /// 停止
    Stop = 4,
    /// 设置机械零位
    SetZero = 6,
    /// 设置 CAN ID
    SetId = 7,
    /// 单个参数读取
    Read = 17,
    /// 单个参数写入（掉电丢失）
    Write = 18,
    /// 参数字符串信息
    ParaStrInfo = 19,
    /// 故障反馈
    Fault = 21,
}

impl CommandType {
    /// 通信类型字段的最大合法值（5 位）
    pub const MAX_RAW: u8 = 0x1F;

    /// 组装 29 位仲裁 ID；枚举取值都在 5 位以内，不需要校验
    pub fn arbitration_id(self, data_field: u16, destination: u8) -> u32 {
        compose(self as u8, data_field, destination)
    }

    /// 原始数值 -> 通信类型，未知数值返回 `InvalidCommandType`
    pub fn from_raw(value: u8) -> Result<Self, ProtocolError> {
        <Self as num_enum::TryFromPrimitive>::try_from_primitive(value)
            .map_err(|_| ProtocolError::InvalidCommandType { value })
    }
}

/// 解包后的仲裁 ID
///
/// `command_type` 保留原始数值，以便上层对未知类型做计数/日志，
/// 需要枚举时调用 [`ArbitrationId::command`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArbitrationId {
    pub command_type: u8,
    pub data_field: u16,
    pub destination: u8,
}

impl ArbitrationId {
    pub fn new(command_type: CommandType, data_field: u16, destination: u8) -> Self {
        Self {
            command_type: command_type as u8,
            data_field,
            destination,
        }
    }

    /// 打包为 29 位 ID
    ///
    /// `command_type` 超过 5 位会让 ID 溢出 29 位，此时返回错误。
    pub fn pack(&self) -> Result<u32, ProtocolError> {
        pack_id(self.command_type, self.data_field, self.destination)
    }

    /// 从 29 位 ID 解包
    pub fn unpack(id: u32) -> Result<Self, ProtocolError> {
        if id & !EXTENDED_ID_MASK != 0 {
            return Err(ProtocolError::InvalidCanId { id });
        }
        Ok(Self {
            command_type: ((id >> 24) & 0x1F) as u8,
            data_field: ((id >> 8) & 0xFFFF) as u16,
            destination: (id & 0xFF) as u8,
        })
    }

    /// 已知的通信类型
    pub fn command(&self) -> Result<CommandType, ProtocolError> {
        CommandType::from_raw(self.command_type)
    }

    /// data_field 低 8 位（反馈帧中为源执行器 ID，指令帧中为主机 ID）
    pub fn data_low(&self) -> u8 {
        (self.data_field & 0xFF) as u8
    }

    /// data_field 高 8 位
    pub fn data_high(&self) -> u8 {
        (self.data_field >> 8) as u8
    }
}

/// `(command_type << 24) | (data_field << 8) | destination`
pub fn pack_id(command_type: u8, data_field: u16, destination: u8) -> Result<u32, ProtocolError> {
    if command_type > CommandType::MAX_RAW {
        return Err(ProtocolError::InvalidCommandType {
            value: command_type,
        });
    }
    Ok(compose(command_type, data_field, destination))
}

fn compose(command_type: u8, data_field: u16, destination: u8) -> u32 {
    ((command_type as u32) << 24) | ((data_field as u32) << 8) | destination as u32
}
