//! Supervisor：对外 API
//!
//! 持有全部 transport 与执行器状态。`start` 之后每个 transport 一个 IO 线程，
//! 调用者线程只操作共享状态（短临界区）或把控制面帧放入有界队列，从不直接碰总线。
//! 未启动时控制面帧由调用者线程直接发送。

use crate::actuator::{ActuatorConfig, ActuatorState, ControlConfig};
use crate::builder::SupervisorBuilder;
use crate::clock::Clock;
use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, SupervisorMetrics};
use crate::pipeline::{
    Bus, ControlFrame, Shared, SharedState, SupervisorConfig, io_loop, run_tick,
};
use arc_swap::ArcSwap;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use robstride_can::Transport;
use robstride_protocol::{
    ActuatorType, Command, ControlCommand, DeviceIdResponse, Frame, MAX_ACTUATOR_ID, ParamValue,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 带超时的线程 join
///
/// 超时后看门狗线程继续等待，由进程退出时回收。
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

enum Lifecycle {
    /// transport 由 Supervisor 持有，可注册、轮询、扫描
    Idle { buses: Vec<Bus> },
    /// transport 已移交给 IO 线程
    Running { handles: Vec<JoinHandle<()>> },
    /// transport 已关闭，不可重启
    Stopped,
}

/// 执行器监控器
///
/// # Example
///
/// ```
/// use robstride_can::SimTransport;
/// use robstride_driver::{ActuatorConfig, ControlCommand, Supervisor};
/// use robstride_protocol::ActuatorType;
///
/// let mut builder = Supervisor::builder();
/// let bus = builder.transport(SimTransport::new(&[(1, ActuatorType::Type02)]));
/// builder.actuator(ActuatorConfig::new(1, ActuatorType::Type02).on_transport(bus));
/// let supervisor = builder.build().unwrap();
///
/// supervisor.command(1, ControlCommand::new(1.0, 0.0, 0.0, 20.0, 0.5)).unwrap();
/// supervisor.poll_once().unwrap();
/// assert!(supervisor.get_state(&[1])[0].online);
/// ```
pub struct Supervisor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    control_tx: Vec<Sender<ControlFrame>>,
    /// stop() 之后拒绝新指令
    stopped: AtomicBool,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// 用给定的 transport 创建 Supervisor，执行器随后通过 [`register`](Self::register) 注册
    pub fn new(
        transports: Vec<Box<dyn Transport>>,
        config: SupervisorConfig,
        clock: Arc<dyn Clock>,
        host_id: u8,
    ) -> Result<Self, DriverError> {
        if config.poll_interval.is_zero() {
            return Err(DriverError::InvalidInput(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if config.control_queue_capacity == 0 {
            return Err(DriverError::InvalidInput(
                "control_queue_capacity must be non-zero".to_string(),
            ));
        }

        let mut control_tx = Vec::with_capacity(transports.len());
        let buses = transports
            .into_iter()
            .enumerate()
            .map(|(index, transport)| {
                let (tx, rx) = crossbeam_channel::bounded(config.control_queue_capacity);
                control_tx.push(tx);
                Bus {
                    index,
                    transport,
                    control_rx: rx,
                    actuators: BTreeMap::new(),
                    last_tick_us: None,
                }
            })
            .collect::<Vec<_>>();

        info!(
            "Supervisor created with {} transport(s), host id {}",
            buses.len(),
            host_id
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SharedState::default()),
                controls: ArcSwap::from_pointee(HashMap::new()),
                metrics: SupervisorMetrics::new(),
                clock,
                config,
                host_id,
                is_running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle { buses }),
            control_tx,
            stopped: AtomicBool::new(false),
        })
    }

    /// 注册执行器
    ///
    /// 全部校验通过才会生效：ID 重复、越界或 transport 下标无效时整批拒绝。
    /// 只能在 `start` 之前调用。
    pub fn register(&self, configs: &[ActuatorConfig]) -> Result<(), DriverError> {
        let mut lifecycle = self.lifecycle.lock();
        let buses = match &mut *lifecycle {
            Lifecycle::Idle { buses } => buses,
            Lifecycle::Running { .. } => return Err(DriverError::AlreadyRunning),
            Lifecycle::Stopped => return Err(DriverError::Stopped),
        };

        let mut state = self.shared.state.lock();
        let mut batch = HashSet::new();
        for config in configs {
            if config.id == 0 || config.id > MAX_ACTUATOR_ID {
                return Err(DriverError::InvalidInput(format!(
                    "actuator id {} out of range 1..={}",
                    config.id, MAX_ACTUATOR_ID
                )));
            }
            if config.transport >= buses.len() {
                return Err(DriverError::InvalidTransportIndex {
                    index: config.transport,
                    available: buses.len(),
                });
            }
            if state.model.contains(config.id) || !batch.insert(config.id) {
                return Err(DriverError::DuplicateRegistration { id: config.id });
            }
        }

        for config in configs {
            state.model.register(*config)?;
            buses[config.transport]
                .actuators
                .insert(config.id, config.actuator_type);
            info!(
                "Registered actuator {} ({}) on transport {}",
                config.id, config.actuator_type, config.transport
            );
        }
        Ok(())
    }

    /// 提交运控指令，覆盖尚未发送的旧指令
    ///
    /// 任一字段为 NaN 或无穷大时返回 `InvalidInput`，已有的待发指令不受影响。
    pub fn command(&self, id: u8, command: ControlCommand) -> Result<(), DriverError> {
        self.ensure_not_stopped()?;
        validate_command(id, &command)?;
        let mut state = self.shared.state.lock();
        if !state.model.contains(id) {
            return Err(DriverError::UnknownActuator { id });
        }
        if state.pending.insert(id, command).is_some() {
            SupervisorMetrics::incr(&self.shared.metrics.commands_coalesced);
            trace!("Actuator {}: pending command replaced", id);
        }
        Ok(())
    }

    /// 用 `configure` 设置的增益生成运控指令并提交
    pub fn command_target(
        &self,
        id: u8,
        position: f64,
        velocity: f64,
        torque: f64,
    ) -> Result<(), DriverError> {
        let control = self.control_config(id);
        self.command(
            id,
            ControlCommand::new(position, velocity, torque, control.kp, control.kd),
        )
    }

    pub fn enable(&self, id: u8) -> Result<(), DriverError> {
        self.dispatch(id, Command::Enable)
    }

    pub fn disable(&self, id: u8) -> Result<(), DriverError> {
        self.dispatch(id, Command::Stop { clear_fault: false })
    }

    /// 停止并清除故障，本地状态回到离线默认值，丢弃待发指令
    pub fn reset(&self, id: u8) -> Result<(), DriverError> {
        self.dispatch(id, Command::Stop { clear_fault: true })?;
        let mut state = self.shared.state.lock();
        state.pending.remove(&id);
        state.model.reset(id)
    }

    /// 把当前位置设为机械零位；任一 ID 未注册时一帧都不发
    pub fn set_zero(&self, ids: &[u8]) -> Result<(), DriverError> {
        {
            let state = self.shared.state.lock();
            if let Some(&id) = ids.iter().find(|&&id| !state.model.contains(id)) {
                return Err(DriverError::UnknownActuator { id });
            }
        }
        for &id in ids {
            self.dispatch(id, Command::SetZero)?;
        }
        Ok(())
    }

    /// 更新运控默认增益与力矩上限；`torque_enabled` 变化时发送使能或停止
    pub fn configure(
        &self,
        id: u8,
        kp: f64,
        kd: f64,
        max_torque: Option<f64>,
        torque_enabled: bool,
    ) -> Result<(), DriverError> {
        if !kp.is_finite() || !kd.is_finite() || max_torque.is_some_and(|t| !t.is_finite()) {
            return Err(DriverError::InvalidInput(format!(
                "non-finite control config for actuator {id}"
            )));
        }
        self.actuator_type(id)?;

        let new = ControlConfig {
            kp,
            kd,
            max_torque,
            torque_enabled,
        };
        let previous = self.shared.controls.rcu(|controls| {
            let mut controls = HashMap::clone(controls);
            controls.insert(id, new);
            controls
        });
        let was_enabled = previous.get(&id).is_some_and(|c| c.torque_enabled);
        debug!("Actuator {} control config: {:?}", id, new);

        match (was_enabled, torque_enabled) {
            (false, true) => self.enable(id),
            (true, false) => self.disable(id),
            _ => Ok(()),
        }
    }

    /// 当前的运控默认配置
    pub fn control_config(&self, id: u8) -> ControlConfig {
        self.shared
            .controls
            .load()
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    /// 状态快照，顺序与 `ids` 一致；未注册的 ID 返回离线占位
    pub fn get_state(&self, ids: &[u8]) -> Vec<ActuatorState> {
        self.shared.state.lock().model.snapshot(ids)
    }

    /// 启动 IO 线程
    ///
    /// `zero_on_init` 型号的执行器会在第一个 tick 之前收到 SetZero。
    pub fn start(&self, poll_interval: Duration) -> Result<(), DriverError> {
        if poll_interval.is_zero() {
            return Err(DriverError::InvalidInput(
                "poll_interval must be non-zero".to_string(),
            ));
        }

        let mut lifecycle = self.lifecycle.lock();
        let mut buses = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle { buses } => buses,
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                return Err(DriverError::AlreadyRunning);
            },
            Lifecycle::Stopped => return Err(DriverError::Stopped),
        };

        // 第一个 tick 之前设置零位，失败只记录（执行器标记离线）
        for bus in buses.iter_mut() {
            let zero: Vec<(u8, ActuatorType)> = bus
                .actuators
                .iter()
                .filter(|(_, ty)| ty.config().zero_on_init)
                .map(|(&id, &ty)| (id, ty))
                .collect();
            for (id, actuator_type) in zero {
                let frame = Command::SetZero.to_frame(id, self.shared.host_id, actuator_type.config());
                let _ = bus.send_frame(&self.shared, id, frame);
            }
        }

        // Release: IO 线程看到 true 时也能看到之前的所有写入
        self.shared.is_running.store(true, Ordering::Release);

        let handles = self.spawn_buses(buses, poll_interval, |name, body| {
            std::thread::Builder::new().name(name).spawn(body)
        })?;

        info!(
            "Supervisor started: {} IO thread(s), poll interval {:?}",
            handles.len(),
            poll_interval
        );
        *lifecycle = Lifecycle::Running { handles };
        Ok(())
    }

    /// 停止 IO 线程并关闭全部 transport（幂等）
    ///
    /// 每条总线上的执行器先收到零力矩运控帧，再收到 Stop。停止后不可再 `start`。
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        self.stopped.store(true, Ordering::Release);
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle { buses } => {
                for mut bus in buses {
                    bus.shutdown(&self.shared);
                }
                info!("Supervisor stopped");
            },
            Lifecycle::Running { handles } => {
                self.shared.is_running.store(false, Ordering::Release);
                join_all(handles, self.shared.config.join_timeout);
                info!("Supervisor stopped");
            },
            Lifecycle::Stopped => {},
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    /// 暂停运控输出
    ///
    /// 暂停期间每个 tick 只发送反馈请求，状态与在线判定照常更新；
    /// 新指令照常合并，恢复后发送最新的一条。
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            info!("Motion output paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            info!("Motion output resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// 在调用者线程上对每个 transport 同步执行一个 tick（仅限未启动时）
    pub fn poll_once(&self) -> Result<(), DriverError> {
        let mut lifecycle = self.lifecycle.lock();
        match &mut *lifecycle {
            Lifecycle::Idle { buses } => {
                for bus in buses.iter_mut() {
                    run_tick(&self.shared, bus, self.shared.config.poll_interval);
                }
                Ok(())
            },
            Lifecycle::Running { .. } => Err(DriverError::AlreadyRunning),
            Lifecycle::Stopped => Err(DriverError::Stopped),
        }
    }

    /// 在一个 transport 上广播 RequestDeviceID（1..=254），返回应答的 ID（升序）
    ///
    /// 需要独占总线，IO 线程运行时返回 `AlreadyRunning`。
    pub fn scan(&self, transport: usize, timeout: Duration) -> Result<Vec<u8>, DriverError> {
        let mut lifecycle = self.lifecycle.lock();
        let buses = match &mut *lifecycle {
            Lifecycle::Idle { buses } => buses,
            Lifecycle::Running { .. } => return Err(DriverError::AlreadyRunning),
            Lifecycle::Stopped => return Err(DriverError::Stopped),
        };
        let available = buses.len();
        let bus = buses
            .get_mut(transport)
            .ok_or(DriverError::InvalidTransportIndex {
                index: transport,
                available,
            })?;

        let scan_cfg = ActuatorType::Type01.config();
        for id in 1..=MAX_ACTUATOR_ID {
            let frame = Command::RequestDeviceId.to_frame(id, self.shared.host_id, scan_cfg);
            bus.transport.send(frame)?;
            SupervisorMetrics::incr(&self.shared.metrics.frames_sent);
        }

        let mut found = BTreeSet::new();
        let clock = &self.shared.clock;
        let deadline_us = clock.now_us() + timeout.as_micros() as u64;
        loop {
            let now_us = clock.now_us();
            if now_us >= deadline_us {
                break;
            }
            let wait = self
                .shared
                .config
                .recv_timeout
                .min(Duration::from_micros(deadline_us - now_us));
            match bus.transport.recv(wait)? {
                Some(frame) => {
                    SupervisorMetrics::incr(&self.shared.metrics.frames_received);
                    let to_host = frame
                        .arbitration_id()
                        .is_ok_and(|id| id.destination == self.shared.host_id);
                    match DeviceIdResponse::try_from(frame) {
                        Ok(response) if to_host && response.actuator_id != 0 => {
                            debug!("Scan: actuator {} answered", response.actuator_id);
                            found.insert(response.actuator_id);
                        },
                        _ => trace!("Scan: ignoring frame 0x{:08X}", frame.id),
                    }
                },
                None => {
                    // recv 可能立即返回，用时钟补足等待
                    let elapsed = Duration::from_micros(clock.now_us().saturating_sub(now_us));
                    if elapsed < wait {
                        clock.sleep(wait - elapsed);
                    }
                },
            }
        }

        info!(
            "Scan on transport {} found {} actuator(s)",
            transport,
            found.len()
        );
        Ok(found.into_iter().collect())
    }

    /// 写入 CAN 超时（秒），按型号换算为参数值
    pub fn set_can_timeout(&self, id: u8, seconds: f64) -> Result<(), DriverError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(DriverError::InvalidInput(format!(
                "invalid CAN timeout {seconds}"
            )));
        }
        let actuator_type = self.actuator_type(id)?;
        self.dispatch(id, Command::set_can_timeout(actuator_type, seconds))
    }

    pub fn write_param(&self, id: u8, index: u16, value: u32) -> Result<(), DriverError> {
        self.dispatch(id, Command::WriteParam { index, value })
    }

    /// 请求读取参数，结果到达后通过 [`param`](Self::param) 获取
    pub fn read_param(&self, id: u8, index: u16) -> Result<(), DriverError> {
        self.actuator_type(id)?;
        self.shared.state.lock().params.remove(&(id, index));
        self.dispatch(id, Command::RequestParam { index })
    }

    /// 最近一次读到的参数值
    pub fn param(&self, id: u8, index: u16) -> Option<ParamValue> {
        self.shared
            .state
            .lock()
            .params
            .get(&(id, index))
            .map(|&raw| ParamValue {
                actuator_id: id,
                index,
                raw,
            })
    }

    pub fn request_feedback(&self, id: u8) -> Result<(), DriverError> {
        self.dispatch(id, Command::RequestFeedback)
    }

    /// 修改执行器的 CAN ID
    ///
    /// 本地注册信息不变：新 ID 的反馈会被当作未注册帧丢弃，需要用新 ID 重新建立 Supervisor。
    pub fn set_device_id(&self, id: u8, new_id: u8) -> Result<(), DriverError> {
        if new_id == 0 || new_id > MAX_ACTUATOR_ID {
            return Err(DriverError::InvalidInput(format!(
                "new id {} out of range 1..={}",
                new_id, MAX_ACTUATOR_ID
            )));
        }
        self.dispatch(id, Command::SetDeviceId { new_id })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn ensure_not_stopped(&self) -> Result<(), DriverError> {
        if self.stopped.load(Ordering::Acquire) {
            Err(DriverError::Stopped)
        } else {
            Ok(())
        }
    }

    fn actuator_type(&self, id: u8) -> Result<ActuatorType, DriverError> {
        self.shared
            .state
            .lock()
            .model
            .config(id)
            .map(|c| c.actuator_type)
            .ok_or(DriverError::UnknownActuator { id })
    }

    /// 编码控制面指令并交给 transport 的所有者
    fn dispatch(&self, id: u8, command: Command) -> Result<(), DriverError> {
        self.ensure_not_stopped()?;
        let (transport, actuator_type) = {
            let state = self.shared.state.lock();
            let config = state
                .model
                .config(id)
                .ok_or(DriverError::UnknownActuator { id })?;
            (config.transport, config.actuator_type)
        };
        let frame: Frame = command.to_frame(id, self.shared.host_id, actuator_type.config());
        debug!("Actuator {}: {:?}", id, command.command_type());

        let mut lifecycle = self.lifecycle.lock();
        match &mut *lifecycle {
            Lifecycle::Idle { buses } => {
                let available = buses.len();
                let bus = buses
                    .get_mut(transport)
                    .ok_or(DriverError::InvalidTransportIndex {
                        index: transport,
                        available,
                    })?;
                bus.send_frame(&self.shared, id, frame)?;
                Ok(())
            },
            Lifecycle::Running { .. } => self.enqueue(transport, ControlFrame {
                actuator_id: id,
                frame,
            }),
            Lifecycle::Stopped => Err(DriverError::Stopped),
        }
    }

    /// 每条总线一个 IO 线程
    ///
    /// bus 在线程创建成功后才通过通道交给线程；创建失败时已启动的线程被停止，
    /// 其余总线就地安全停机。
    fn spawn_buses<F>(
        &self,
        buses: Vec<Bus>,
        poll_interval: Duration,
        mut spawn_thread: F,
    ) -> Result<Vec<JoinHandle<()>>, DriverError>
    where
        F: FnMut(String, Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>>,
    {
        let mut handles = Vec::with_capacity(buses.len());
        let mut buses = buses.into_iter();
        while let Some(bus) = buses.next() {
            let (tx, rx) = crossbeam_channel::bounded::<Bus>(1);
            let shared = self.shared.clone();
            let body: Box<dyn FnOnce() + Send> = Box::new(move || {
                if let Ok(bus) = rx.recv() {
                    io_loop(shared, bus, poll_interval);
                }
            });

            match spawn_thread(format!("robstride-bus-{}", bus.index), body) {
                Ok(handle) => {
                    if let Err(unsent) = tx.send(bus) {
                        unsent.into_inner().shutdown(&self.shared);
                    }
                    handles.push(handle);
                },
                Err(e) => {
                    error!("Failed to spawn IO thread for bus {}: {}", bus.index, e);
                    self.shared.is_running.store(false, Ordering::Release);
                    self.stopped.store(true, Ordering::Release);
                    join_all(handles, self.shared.config.join_timeout);
                    for mut rest in std::iter::once(bus).chain(buses) {
                        rest.shutdown(&self.shared);
                    }
                    return Err(DriverError::IoThread(e.to_string()));
                },
            }
        }
        Ok(handles)
    }

    fn enqueue(&self, transport: usize, control: ControlFrame) -> Result<(), DriverError> {
        let tx = self
            .control_tx
            .get(transport)
            .ok_or(DriverError::InvalidTransportIndex {
                index: transport,
                available: self.control_tx.len(),
            })?;
        tx.try_send(control).map_err(|e| match e {
            TrySendError::Full(_) => DriverError::ChannelFull,
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }
}

fn validate_command(id: u8, command: &ControlCommand) -> Result<(), DriverError> {
    let fields = [
        ("position", command.position),
        ("velocity", command.velocity),
        ("torque", command.torque),
        ("kp", command.kp),
        ("kd", command.kd),
    ];
    match fields.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => Err(DriverError::InvalidInput(format!(
            "actuator {id}: {name} is {value}"
        ))),
        None => Ok(()),
    }
}

fn join_all(handles: Vec<JoinHandle<()>>, timeout: Duration) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("io").to_string();
        if handle.join_timeout(timeout).is_err() {
            error!("{} thread panicked or failed to stop within {:?}", name, timeout);
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
