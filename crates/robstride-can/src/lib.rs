//! # RobStride Transport Layer
//!
//! 传输抽象层：Supervisor 只依赖 [`Transport`] trait，
//! 硬件（SocketCAN）与仿真（[`SimTransport`]）在构造时选择，调用时不再分支。

use std::time::Duration;
use thiserror::Error;

// 重新导出 robstride-protocol 中的 Frame
pub use robstride_protocol::Frame;

pub mod sim;

pub use sim::{SimActuator, SimHandle, SimTransport};

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanTransport;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Bus off")]
    BusOff,
    #[error("Transport closed")]
    Closed,
    /// 收到无法作为数据帧处理的帧（远程帧、标准帧等）
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl TransportError {
    /// 不可恢复的错误：继续重试没有意义
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::BusOff => true,
            TransportError::Device(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NoDevice | DeviceErrorKind::AccessDenied | DeviceErrorKind::NotFound
        )
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

/// 帧收发能力
///
/// - `send`：发送一帧，不等待设备应答
/// - `recv`：最多等待 `timeout`，超时返回 `Ok(None)`，从不无限阻塞
/// - `close`：释放底层资源；之后的 `send`/`recv` 返回 `TransportError::Closed`
///
/// 每个 transport 由 Supervisor 独占，只在一个 IO 线程中使用，因此要求 `Send`。
pub trait Transport: Send {
    fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError>;

    /// 非阻塞接收
    fn try_recv(&mut self) -> Result<Option<Frame>, TransportError> {
        self.recv(Duration::ZERO)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// 用于日志的名称（如 "can0"）
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        (**self).recv(timeout)
    }

    fn try_recv(&mut self) -> Result<Option<Frame>, TransportError> {
        (**self).try_recv()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_fatal_kinds() {
        assert!(DeviceError::new(DeviceErrorKind::NoDevice, "gone").is_fatal());
        assert!(DeviceError::new(DeviceErrorKind::AccessDenied, "perm").is_fatal());
        assert!(!DeviceError::new(DeviceErrorKind::Busy, "busy").is_fatal());
        assert!(!DeviceError::from("plain").is_fatal());
    }

    #[test]
    fn test_transport_error_fatal() {
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::BusOff.is_fatal());
        assert!(!TransportError::Timeout.is_fatal());
        assert!(!TransportError::InvalidFrame("remote".into()).is_fatal());
        let err: TransportError = DeviceError::new(DeviceErrorKind::NotFound, "can9").into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Device(DeviceError::new(DeviceErrorKind::Busy, "in use"));
        assert_eq!(err.to_string(), "Device Error: Busy: in use");
        assert_eq!(TransportError::Closed.to_string(), "Transport closed");
    }
}
