//! SocketCAN transport
//!
//! Linux 内核 SocketCAN 接口。波特率等配置由系统工具（`ip link`）完成，不在应用层设置。
//!
//! - 只处理扩展数据帧；错误帧映射为 `TransportError`，远程帧与标准帧报告为 `InvalidFrame`
//! - 关闭 loopback，避免自己发出的帧被当作响应读回
//! - `recv` 使用 `poll` 实现有界等待

use crate::{DeviceError, DeviceErrorKind, Frame, Transport, TransportError};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use socketcan::{
    BlockingCan, CanError as SocketCanError, CanFrame, CanSocket, EmbeddedFrame, ExtendedId,
    Frame as _, Socket,
};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::{error, trace, warn};

/// SocketCAN transport
///
/// ```no_run
/// use robstride_can::{SocketCanTransport, Transport};
/// use std::time::Duration;
///
/// let mut bus = SocketCanTransport::open("can0").unwrap();
/// let frame = bus.recv(Duration::from_millis(5)).unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanTransport {
    socket: Option<CanSocket>,
    interface: String,
}

impl SocketCanTransport {
    /// 打开 CAN 接口（如 "can0"、"vcan0"）
    ///
    /// # 错误
    /// - `TransportError::Device`：接口不存在或无法打开
    pub fn open(interface: impl Into<String>) -> Result<Self, TransportError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            let kind = match e.kind() {
                std::io::ErrorKind::NotFound => DeviceErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => DeviceErrorKind::AccessDenied,
                _ => DeviceErrorKind::Backend,
            };
            DeviceError::new(
                kind,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            )
        })?;

        let loopback_enabled: libc::c_int = 0;
        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_LOOPBACK,
                &loopback_enabled as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            warn!(
                "Failed to disable CAN_RAW_LOOPBACK on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        }

        trace!("SocketCAN interface '{}' opened", interface);
        Ok(Self {
            socket: Some(socket),
            interface,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn socket(&mut self) -> Result<&mut CanSocket, TransportError> {
        self.socket.as_mut().ok_or(TransportError::Closed)
    }
}

fn to_can_frame(frame: &Frame) -> Result<CanFrame, TransportError> {
    ExtendedId::new(frame.id)
        .and_then(|id| CanFrame::new(id, frame.data_slice()))
        .ok_or_else(|| {
            DeviceError::new(
                DeviceErrorKind::InvalidFrame,
                format!("Failed to create extended frame with ID 0x{:X}", frame.id),
            )
            .into()
        })
}

fn from_can_frame(can_frame: CanFrame) -> Result<Frame, TransportError> {
    match can_frame {
        CanFrame::Data(data) => {
            if !data.is_extended() {
                return Err(TransportError::InvalidFrame(format!(
                    "standard frame 0x{:X}",
                    data.raw_id()
                )));
            }
            Ok(Frame::new(data.raw_id(), data.data()))
        },
        CanFrame::Remote(remote) => Err(TransportError::InvalidFrame(format!(
            "remote frame 0x{:X}",
            remote.raw_id()
        ))),
        CanFrame::Error(err) => match SocketCanError::from(err) {
            SocketCanError::BusOff => {
                error!("CAN Bus Off error detected");
                Err(TransportError::BusOff)
            },
            other => Err(DeviceError::new(DeviceErrorKind::Backend, other.to_string()).into()),
        },
    }
}

impl Transport for SocketCanTransport {
    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let can_frame = to_can_frame(&frame)?;
        self.socket()?.transmit(&can_frame).map_err(|e| {
            TransportError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error: {}",
                e
            )))
        })?;
        trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let socket = self.socket()?;

        let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        let fd = socket.as_raw_fd();
        // fd 属于 socket，poll 期间 socket 一直存活
        let pollfd = PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN);
        let ready = poll(&mut [pollfd], PollTimeout::from(timeout_ms)).map_err(|e| {
            TransportError::Io(std::io::Error::other(format!("poll failed: {}", e)))
        })?;
        if ready == 0 {
            return Ok(None);
        }

        let can_frame = match socket.read_frame() {
            Ok(f) => f,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(None);
            },
            Err(e) => return Err(TransportError::Io(e)),
        };

        let frame = from_can_frame(can_frame)?;
        trace!("Received CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.socket.take().is_some() {
            trace!("SocketCAN interface '{}' closed", self.interface);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.interface
    }
}
