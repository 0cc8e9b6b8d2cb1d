//! # RobStride Protocol
//!
//! RobStride 执行器 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `codec`: 物理量与 16 位定点数之间的线性映射
//! - `ids`: 29 位扩展仲裁 ID 的打包/解包，通信类型
//! - `types`: 执行器型号及其静态物理参数表
//! - `control`: 控制帧构建（主机 -> 执行器）
//! - `feedback`: 反馈帧解析（执行器 -> 主机）
//! - `params`: 参数索引常量
//!
//! ## 字节序
//!
//! 运控帧与反馈帧的物理量使用大端字节序（高位在前），
//! 参数读写帧的索引与数值使用小端字节序。

pub mod codec;
pub mod control;
pub mod feedback;
pub mod ids;
pub mod params;
pub mod types;

// 重新导出常用类型
pub use codec::*;
pub use control::*;
pub use feedback::*;
pub use ids::*;
pub use types::*;

use thiserror::Error;

/// 29 位扩展帧 ID 的最大值
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// CAN 2.0 扩展帧的统一抽象
///
/// `Frame` 是协议层和传输层之间的中间抽象：
///
/// ```text
/// Protocol Layer (robstride-protocol)
///     ↓ TryFrom<Frame> 解析 / Command::to_frame() 构建
/// Frame (此类型)
///     ↓ 转换逻辑在传输层实现
/// Transport Layer (robstride-can)
///     ↓ SocketCAN / 仿真
/// Hardware
/// ```
///
/// - **Copy**：固定 8 字节数据，无堆分配
/// - **只有扩展帧**：RobStride 协议全部使用 29 位 ID
/// - `timestamp_us`：接收时间戳（微秒），0 表示不可用
///
/// ```rust
/// use robstride_protocol::Frame;
///
/// let frame = Frame::new(0x0300_0001, &[0]);
/// assert_eq!(frame.id(), 0x0300_0001);
/// assert_eq!(frame.data_slice(), &[0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// 29 位仲裁 ID
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl Frame {
    /// 创建扩展帧，ID 超出 29 位的部分被截掉，数据超出 8 字节的部分被丢弃
    pub fn new(id: u32, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: id & EXTENDED_ID_MASK,
            data: fixed_data,
            len: len as u8,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取仲裁 ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 解包仲裁 ID
    pub fn arbitration_id(&self) -> Result<ArbitrationId, ProtocolError> {
        ArbitrationId::unpack(self.id)
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Invalid communication type: {value}")]
    InvalidCommandType { value: u8 },

    #[error("Unexpected communication type: expected {expected:?}, got {actual:?}")]
    UnexpectedCommand {
        expected: CommandType,
        actual: CommandType,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u32 },
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// u16 转大端字节序
pub fn u16_to_bytes_be(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// 小端字节序转 u32（参数读写与故障帧使用）
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}
