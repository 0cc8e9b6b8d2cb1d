//! 驱动层错误类型定义

use robstride_can::TransportError;
use robstride_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 注册阶段的错误（`DuplicateRegistration`、`InvalidTransportIndex`）是致命的，
/// 直接返回给调用者；循环内的逐帧错误只体现在状态快照和指标里，不会以错误形式返回。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 执行器未注册
    #[error("Unknown actuator: {id}")]
    UnknownActuator { id: u8 },

    /// 执行器 ID 重复注册
    #[error("Actuator {id} registered twice")]
    DuplicateRegistration { id: u8 },

    /// transport 下标越界
    #[error("Invalid transport index {index} (have {available})")]
    InvalidTransportIndex { index: usize, available: usize },

    /// 控制循环已在运行
    #[error("Supervisor loop already running")]
    AlreadyRunning,

    /// 已停止，transport 已释放
    #[error("Supervisor stopped")]
    Stopped,

    /// 控制帧通道已关闭（IO 线程退出）
    #[error("Control channel closed")]
    ChannelClosed,

    /// 控制帧通道已满
    #[error("Control channel full")]
    ChannelFull,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),
}
