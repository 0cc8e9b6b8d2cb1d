//! Pipeline IO 循环模块
//!
//! 每个 transport 一个 [`Bus`]，每个 tick 依次：
//! 1. 发送控制面队列中的帧（使能、停止、参数读写……）
//! 2. 每个执行器发送一帧：待发运控指令（钳位、安全检查后），
//!    没有可发指令时发送反馈请求，保证空闲执行器也持续应答
//! 3. 在 tick 预算内排空接收，解码并更新执行器状态
//! 4. 按 [`FreshnessPolicy`] 判定离线，新离线的执行器发送 Stop
//!
//! IO 线程退出时先发零力矩运控帧，再发 Stop，最后关闭 transport。
//!
//! 共享状态只在短临界区内修改，任何 CAN IO 都不在持锁期间进行。

use crate::actuator::{ActuatorModel, ControlConfig};
use crate::clock::Clock;
use crate::metrics::SupervisorMetrics;
use arc_swap::ArcSwap;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use robstride_can::Transport;
use robstride_protocol::{ActuatorType, Command, ControlCommand, Frame, Response, source_id};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 离线判定策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// 不做离线判定，只有发送失败才会标记离线
    Disabled,
    /// 一个 tick 内没有收到反馈即标记离线
    EveryTick,
    /// 最近一次反馈早于给定时长即标记离线
    Timeout(Duration),
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        FreshnessPolicy::Timeout(Duration::from_millis(100))
    }
}

/// Supervisor 配置
///
/// # Example
///
/// ```
/// use robstride_driver::{FreshnessPolicy, SupervisorConfig};
/// use std::time::Duration;
///
/// let config = SupervisorConfig {
///     poll_interval: Duration::from_millis(5),
///     freshness: FreshnessPolicy::EveryTick,
///     ..Default::default()
/// };
/// assert_eq!(config.max_drain_per_tick, 32);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// tick 周期（`poll_once` 的接收预算也使用它）
    pub poll_interval: Duration,
    /// 单次 `recv` 的最长等待
    pub recv_timeout: Duration,
    pub freshness: FreshnessPolicy,
    /// 每个 tick 最多处理的接收帧数
    pub max_drain_per_tick: usize,
    /// 每个 transport 的控制面队列容量
    pub control_queue_capacity: usize,
    /// `stop` 等待 IO 线程退出的时长
    pub join_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            recv_timeout: Duration::from_millis(1),
            freshness: FreshnessPolicy::default(),
            max_drain_per_tick: 32,
            control_queue_capacity: 64,
            join_timeout: Duration::from_secs(2),
        }
    }
}

/// 控制面帧：已编码，不合并，按 FIFO 顺序发送
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControlFrame {
    pub actuator_id: u8,
    pub frame: Frame,
}

/// 受锁保护的可变状态
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub model: ActuatorModel,
    /// 每个执行器最多一条待发运控指令，新指令直接覆盖
    pub pending: HashMap<u8, ControlCommand>,
    /// 最近一次读到的参数值
    pub params: HashMap<(u8, u16), u32>,
    /// 最近一次发出运控帧的时间（微秒），用于限速
    pub last_motion_us: HashMap<u8, u64>,
}

/// Supervisor 与 IO 线程共享的上下文
pub(crate) struct Shared {
    pub state: Mutex<SharedState>,
    /// 读多写少：每次 tick 读取，`configure` 时整体替换
    pub controls: ArcSwap<HashMap<u8, ControlConfig>>,
    pub metrics: SupervisorMetrics,
    pub clock: Arc<dyn Clock>,
    pub config: SupervisorConfig,
    pub host_id: u8,
    pub is_running: AtomicBool,
    /// 暂停时不发运控帧，只请求反馈
    pub paused: AtomicBool,
}

impl Shared {
    /// 标记离线并计数
    pub fn mark_offline(&self, id: u8) {
        if self.state.lock().model.mark_offline(id) {
            SupervisorMetrics::incr(&self.metrics.offline_transitions);
        }
    }

    /// 清除使能标记（执行器已被停止）
    pub fn clear_torque_enabled(&self, id: u8) {
        if !self.controls.load().get(&id).is_some_and(|c| c.torque_enabled) {
            return;
        }
        self.controls.rcu(|controls| {
            let mut controls = HashMap::clone(controls);
            if let Some(control) = controls.get_mut(&id) {
                control.torque_enabled = false;
            }
            controls
        });
    }
}

/// 一条总线：transport 及其上注册的执行器
pub(crate) struct Bus {
    pub index: usize,
    pub transport: Box<dyn Transport>,
    pub control_rx: Receiver<ControlFrame>,
    /// 按 ID 排序，保证每个 tick 的发送顺序固定
    pub actuators: BTreeMap<u8, ActuatorType>,
    /// 上一个 tick 的开始时间，用于统计实际频率
    pub last_tick_us: Option<u64>,
}

impl Bus {
    /// 发送一帧；失败时把目标执行器标记为离线
    pub fn send_frame(
        &mut self,
        shared: &Shared,
        actuator_id: u8,
        frame: Frame,
    ) -> Result<(), robstride_can::TransportError> {
        trace!(
            "bus[{}] -> 0x{:08X} {:02X?}",
            self.index,
            frame.id,
            frame.data_slice()
        );
        match self.transport.send(frame) {
            Ok(()) => {
                SupervisorMetrics::incr(&shared.metrics.frames_sent);
                Ok(())
            },
            Err(e) => {
                SupervisorMetrics::incr(&shared.metrics.send_errors);
                warn!(
                    "Send to actuator {} on {} failed: {}",
                    actuator_id,
                    self.transport.name(),
                    e
                );
                shared.mark_offline(actuator_id);
                Err(e)
            },
        }
    }

    /// 发送控制面队列中积压的帧
    fn flush_control(&mut self, shared: &Shared) {
        while let Ok(control) = self.control_rx.try_recv() {
            let _ = self.send_frame(shared, control.actuator_id, control.frame);
        }
    }

    /// 安全停机：所有执行器先收到零力矩运控帧，再收到 Stop，然后关闭 transport
    pub fn shutdown(&mut self, shared: &Shared) {
        let targets: SmallVec<[(u8, ActuatorType); 16]> =
            self.actuators.iter().map(|(&id, &ty)| (id, ty)).collect();
        for &(id, actuator_type) in &targets {
            let frame = ControlCommand::default().to_frame(id, actuator_type.config());
            let _ = self.send_frame(shared, id, frame);
        }
        for &(id, actuator_type) in &targets {
            let frame = Command::Stop { clear_fault: false }.to_frame(
                id,
                shared.host_id,
                actuator_type.config(),
            );
            let _ = self.send_frame(shared, id, frame);
        }
        if let Err(e) = self.transport.close() {
            warn!("Failed to close {}: {}", self.transport.name(), e);
        }
        debug!("Bus {} shut down ({} actuator(s) stopped)", self.index, targets.len());
    }

    /// 处理一帧接收数据，返回刷新了反馈的执行器 ID
    fn ingest(&self, shared: &Shared, frame: &Frame) -> Option<u8> {
        let id = match source_id(frame) {
            Ok(id) => id,
            Err(e) => {
                SupervisorMetrics::incr(&shared.metrics.decode_errors);
                warn!("Undecodable frame on {}: {}", self.transport.name(), e);
                return None;
            },
        };

        let Some(&actuator_type) = self.actuators.get(&id) else {
            SupervisorMetrics::incr(&shared.metrics.unknown_frames);
            trace!("Dropping frame 0x{:08X} from unregistered actuator {}", frame.id, id);
            return None;
        };

        let response = match Response::decode(frame, actuator_type.config()) {
            Ok(response) => response,
            Err(e) => {
                SupervisorMetrics::incr(&shared.metrics.decode_errors);
                warn!("Bad frame from actuator {}: {}", id, e);
                return None;
            },
        };

        let now_us = shared.clock.now_us();
        let mut state = shared.state.lock();
        match response {
            Response::Feedback(feedback) => {
                match state.model.update_from_feedback(id, &feedback, now_us) {
                    Ok(_) => Some(id),
                    Err(_) => None,
                }
            },
            Response::Fault(report) => {
                if report.has_fault() {
                    warn!(
                        "Actuator {} fault report: faults=0x{:08X} warnings=0x{:08X}",
                        id, report.fault_bits, report.warning_bits
                    );
                }
                let _ = state.model.record_fault(report);
                None
            },
            Response::Param(param) => {
                state.params.insert((id, param.index), param.raw);
                None
            },
            Response::DeviceId(device) => {
                debug!("Actuator {} uid {:02X?}", id, device.uid);
                None
            },
        }
    }
}

/// 执行一个 tick，`budget` 为本 tick 的接收时间预算
pub(crate) fn run_tick(shared: &Shared, bus: &mut Bus, budget: Duration) {
    let started_us = shared.clock.now_us();
    if let Some(previous_us) = bus.last_tick_us.replace(started_us) {
        let interval_us = started_us.saturating_sub(previous_us);
        if interval_us > 0 {
            shared.metrics.record_tick_interval(interval_us);
        }
    }

    // 控制面帧优先于运控帧
    bus.flush_control(shared);

    for (id, frame) in take_outgoing_frames(shared, bus) {
        let _ = bus.send_frame(shared, id, frame);
    }

    let mut refreshed: SmallVec<[u8; 16]> = SmallVec::new();
    for _ in 0..shared.config.max_drain_per_tick {
        let elapsed = Duration::from_micros(shared.clock.now_us().saturating_sub(started_us));
        let timeout = shared.config.recv_timeout.min(budget.saturating_sub(elapsed));
        match bus.transport.recv(timeout) {
            Ok(Some(frame)) => {
                SupervisorMetrics::incr(&shared.metrics.frames_received);
                trace!(
                    "bus[{}] <- 0x{:08X} {:02X?}",
                    bus.index,
                    frame.id,
                    frame.data_slice()
                );
                if let Some(id) = bus.ingest(shared, &frame) {
                    refreshed.push(id);
                }
            },
            Ok(None) => break,
            Err(e) if e.is_fatal() => {
                SupervisorMetrics::incr(&shared.metrics.recv_errors);
                warn!("Receive on {} failed: {}", bus.transport.name(), e);
                break;
            },
            // 单帧错误不影响排在后面的帧
            Err(e) => {
                SupervisorMetrics::incr(&shared.metrics.recv_errors);
                debug!("Skipping bad frame on {}: {}", bus.transport.name(), e);
            },
        }
    }

    check_freshness(shared, bus, &refreshed);
    SupervisorMetrics::incr(&shared.metrics.ticks);
}

/// 本 tick 每个执行器的一帧：可发的运控指令，否则是反馈请求
fn take_outgoing_frames(shared: &Shared, bus: &Bus) -> SmallVec<[(u8, Frame); 8]> {
    let controls = shared.controls.load();
    let paused = shared.paused.load(Ordering::Acquire);
    let now_us = shared.clock.now_us();
    let mut frames = SmallVec::new();
    let mut state = shared.state.lock();
    let SharedState {
        model,
        pending,
        last_motion_us,
        ..
    } = &mut *state;

    for (&id, &actuator_type) in &bus.actuators {
        let motion = if paused {
            None
        } else {
            take_motion(shared, id, model, pending, last_motion_us, now_us)
        };
        let frame = match motion {
            Some(command) => {
                let limit = controls
                    .get(&id)
                    .copied()
                    .unwrap_or_default()
                    .torque_limit(actuator_type);
                command
                    .with_torque_limit(limit)
                    .to_frame(id, actuator_type.config())
            },
            None => Command::RequestFeedback.to_frame(id, shared.host_id, actuator_type.config()),
        };
        frames.push((id, frame));
    }
    frames
}

/// 取出一条可发送的运控指令
///
/// 限速期间指令保留到下一个 tick；被安全限制拦下的指令直接丢弃。
fn take_motion(
    shared: &Shared,
    id: u8,
    model: &ActuatorModel,
    pending: &mut HashMap<u8, ControlCommand>,
    last_motion_us: &mut HashMap<u8, u64>,
    now_us: u64,
) -> Option<ControlCommand> {
    let config = model.config(id)?;

    if let (Some(interval), Some(&last_us)) = (config.min_command_interval, last_motion_us.get(&id))
    {
        if now_us.saturating_sub(last_us) < interval.as_micros() as u64 {
            if pending.contains_key(&id) {
                trace!("Actuator {}: command held by rate limit", id);
            }
            return None;
        }
    }

    let command = pending.remove(&id)?;

    if let Some(max_velocity) = config.max_velocity {
        if command.velocity.abs() > max_velocity {
            SupervisorMetrics::incr(&shared.metrics.commands_dropped);
            warn!(
                "Actuator {}: velocity {:.3} exceeds limit {:.3}, command dropped",
                id, command.velocity, max_velocity
            );
            return None;
        }
    }

    // 只有收到过反馈才有参考位置
    if let (Some(max_change), Some(current)) = (config.max_angle_change, model.state(id)) {
        if current.last_feedback_us.is_some()
            && (command.position - current.position).abs() > max_change
        {
            SupervisorMetrics::incr(&shared.metrics.commands_dropped);
            warn!(
                "Actuator {}: position jump {:.3} -> {:.3} exceeds {:.3}, command dropped",
                id, current.position, command.position, max_change
            );
            return None;
        }
    }

    last_motion_us.insert(id, now_us);
    Some(command)
}

/// 判定离线；刚离线的执行器发送 Stop 并清除使能标记
fn check_freshness(shared: &Shared, bus: &mut Bus, refreshed: &[u8]) {
    let stale: SmallVec<[u8; 16]> = match shared.config.freshness {
        FreshnessPolicy::Disabled => return,
        FreshnessPolicy::EveryTick => bus
            .actuators
            .keys()
            .copied()
            .filter(|id| !refreshed.contains(id))
            .collect(),
        FreshnessPolicy::Timeout(max_age) => {
            let now_us = shared.clock.now_us();
            let max_age_us = max_age.as_micros() as u64;
            let state = shared.state.lock();
            bus.actuators
                .keys()
                .copied()
                .filter(|&id| {
                    state.model.state(id).is_some_and(|s| {
                        s.online
                            && s.last_feedback_us
                                .is_some_and(|t| now_us.saturating_sub(t) > max_age_us)
                    })
                })
                .collect()
        },
    };

    if stale.is_empty() {
        return;
    }
    let went_offline: SmallVec<[u8; 16]> = {
        let mut state = shared.state.lock();
        stale
            .into_iter()
            .filter(|&id| state.model.mark_offline(id))
            .collect()
    };

    for id in went_offline {
        SupervisorMetrics::incr(&shared.metrics.offline_transitions);
        warn!("Actuator {} feedback timeout, marked offline and stopped", id);
        if let Some(&actuator_type) = bus.actuators.get(&id) {
            let frame = Command::Stop { clear_fault: false }.to_frame(
                id,
                shared.host_id,
                actuator_type.config(),
            );
            let _ = bus.send_frame(shared, id, frame);
        }
        shared.clear_torque_enabled(id);
    }
}

/// IO 线程主循环
///
/// 按 `poll_interval` 节拍运行 tick，直到 `is_running` 变为 false。
/// 退出前发完积压的控制面帧，再执行 [`Bus::shutdown`]。
pub(crate) fn io_loop(shared: Arc<Shared>, mut bus: Bus, poll_interval: Duration) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::info;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Bus {} IO thread priority set to MAX (realtime)", bus.index);
            },
            Err(e) => {
                warn!(
                    "Failed to set bus {} IO thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    bus.index, e
                );
            },
        }
    }

    let interval_us = poll_interval.as_micros() as u64;
    let mut next_tick_us = shared.clock.now_us();

    // Acquire: 看到 false 时也能看到 stop() 之前的所有写入
    while shared.is_running.load(Ordering::Acquire) {
        run_tick(&shared, &mut bus, poll_interval);

        next_tick_us += interval_us;
        let now_us = shared.clock.now_us();
        if next_tick_us > now_us {
            shared
                .clock
                .sleep(Duration::from_micros(next_tick_us - now_us));
        } else {
            // 落后时不追赶，从当前时刻重新计时
            next_tick_us = now_us;
        }
    }

    bus.flush_control(&shared);
    bus.shutdown(&shared);
    debug!("Bus {} IO thread exited", bus.index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorConfig;
    use crate::clock::ManualClock;
    use robstride_can::{SimHandle, SimTransport};
    use robstride_protocol::{CommandType, Feedback, pack_id};

    fn setup(freshness: FreshnessPolicy) -> (Shared, Bus, SimHandle) {
        let sim = SimTransport::new(&[(1, ActuatorType::Type01), (2, ActuatorType::Type04)]);
        let handle = sim.handle();
        let mut model = ActuatorModel::new();
        model
            .register(ActuatorConfig::new(1, ActuatorType::Type01).with_max_velocity(10.0))
            .unwrap();
        model
            .register(ActuatorConfig::new(2, ActuatorType::Type04))
            .unwrap();

        let shared = Shared {
            state: Mutex::new(SharedState {
                model,
                ..Default::default()
            }),
            controls: ArcSwap::from_pointee(HashMap::new()),
            metrics: SupervisorMetrics::new(),
            clock: Arc::new(ManualClock::new()),
            config: SupervisorConfig {
                freshness,
                ..Default::default()
            },
            host_id: 0,
            is_running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        };
        let (_tx, rx) = crossbeam_channel::bounded(4);
        let bus = Bus {
            index: 0,
            transport: Box::new(sim),
            control_rx: rx,
            actuators: BTreeMap::from([(1, ActuatorType::Type01), (2, ActuatorType::Type04)]),
            last_tick_us: None,
        };
        (shared, bus, handle)
    }

    fn command_types(frames: &[Frame]) -> Vec<u8> {
        frames
            .iter()
            .map(|f| f.arbitration_id().unwrap().command_type)
            .collect()
    }

    const BUDGET: Duration = Duration::from_millis(10);
    const CONTROL: u8 = CommandType::Control as u8;
    const FEEDBACK: u8 = CommandType::Feedback as u8;
    const STOP: u8 = CommandType::Stop as u8;

    #[test]
    fn test_tick_sends_and_ingests() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::Disabled);
        shared
            .state
            .lock()
            .pending
            .insert(1, ControlCommand::new(0.5, 0.0, 0.0, 10.0, 1.0));

        run_tick(&shared, &mut bus, BUDGET);

        // 1 号发运控帧，空闲的 2 号发反馈请求
        assert_eq!(command_types(&handle.sent_frames()), vec![CONTROL, FEEDBACK]);
        let state = shared.state.lock();
        assert!(state.pending.is_empty());
        let s = state.model.state(1).unwrap();
        assert!(s.online);
        assert!((s.position - 0.5).abs() <= ActuatorType::Type01.config().position.resolution());
        assert!(state.model.state(2).unwrap().online);
        drop(state);

        let m = shared.metrics.snapshot();
        assert_eq!(m.ticks, 1);
        assert_eq!(m.frames_sent, 2);
        assert_eq!(m.frames_received, 2);
    }

    #[test]
    fn test_idle_actuators_are_polled() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::default());
        for _ in 0..3 {
            run_tick(&shared, &mut bus, BUDGET);
        }
        let sent = handle.sent_frames();
        assert_eq!(sent.len(), 6);
        assert!(command_types(&sent).iter().all(|&t| t == FEEDBACK));
        let state = shared.state.lock();
        assert_eq!(state.model.state(1).unwrap().messages_received, 3);
        assert_eq!(state.model.state(2).unwrap().messages_received, 3);
    }

    #[test]
    fn test_velocity_guard_drops_command() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::Disabled);
        shared
            .state
            .lock()
            .pending
            .insert(1, ControlCommand::new(0.0, 20.0, 0.0, 0.0, 0.0));

        run_tick(&shared, &mut bus, BUDGET);

        assert!(!command_types(&handle.sent_frames()).contains(&CONTROL));
        assert_eq!(shared.metrics.snapshot().commands_dropped, 1);
        assert!(shared.state.lock().pending.is_empty());
    }

    #[test]
    fn test_every_tick_freshness_stops_silent_actuator() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::EveryTick);
        run_tick(&shared, &mut bus, BUDGET);
        assert!(shared.state.lock().model.state(2).unwrap().online);
        handle.take_sent();

        handle.set_silent(2, true);
        run_tick(&shared, &mut bus, BUDGET);
        assert!(!shared.state.lock().model.state(2).unwrap().online);
        assert!(shared.state.lock().model.state(1).unwrap().online);
        assert_eq!(shared.metrics.snapshot().offline_transitions, 1);

        let stops: Vec<u8> = handle
            .sent_frames()
            .iter()
            .filter(|f| f.arbitration_id().unwrap().command_type == STOP)
            .map(|f| f.arbitration_id().unwrap().destination)
            .collect();
        assert_eq!(stops, vec![2]);

        // 已离线不再重复发送 Stop
        handle.take_sent();
        run_tick(&shared, &mut bus, BUDGET);
        assert!(!command_types(&handle.sent_frames()).contains(&STOP));
    }

    #[test]
    fn test_freshness_timeout_clears_torque_enabled() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::Timeout(Duration::from_millis(50)));
        shared.controls.store(Arc::new(HashMap::from([(
            2,
            ControlConfig {
                torque_enabled: true,
                ..Default::default()
            },
        )])));
        run_tick(&shared, &mut bus, BUDGET);

        handle.set_silent(2, true);
        for _ in 0..6 {
            // ManualClock 的 sleep 直接推进时间
            shared.clock.sleep(Duration::from_millis(10));
            run_tick(&shared, &mut bus, BUDGET);
        }
        assert!(!shared.state.lock().model.state(2).unwrap().online);
        assert!(!shared.controls.load().get(&2).unwrap().torque_enabled);
    }

    #[test]
    fn test_unknown_and_malformed_frames_counted() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::Disabled);
        handle.set_silent(1, true);
        handle.set_silent(2, true);
        let cfg = ActuatorType::Type01.config();
        let feedback = Feedback {
            actuator_id: 9,
            host_id: 0,
            position: 0.0,
            velocity: 0.0,
            torque: 0.0,
            temperature: 20.0,
            mode: Default::default(),
            faults: Default::default(),
        };
        handle.inject(feedback.to_frame(cfg));
        handle.inject(Frame::new(pack_id(2, 0x0001, 0).unwrap(), &[0; 5]));

        run_tick(&shared, &mut bus, BUDGET);

        let m = shared.metrics.snapshot();
        assert_eq!(m.frames_received, 2);
        assert_eq!(m.unknown_frames, 1);
        assert_eq!(m.decode_errors, 1);
        assert!(!shared.state.lock().model.state(1).unwrap().online);
    }

    #[test]
    fn test_drain_limit_per_tick() {
        let (mut shared, mut bus, handle) = setup(FreshnessPolicy::Disabled);
        handle.set_silent(1, true);
        handle.set_silent(2, true);
        shared.config.max_drain_per_tick = 2;
        for _ in 0..5 {
            handle.inject(Frame::new(pack_id(2, 0x0050, 0).unwrap(), &[0; 8]));
        }
        run_tick(&shared, &mut bus, BUDGET);
        assert_eq!(handle.pending_rx(), 3);
        assert_eq!(shared.metrics.snapshot().frames_received, 2);
    }

    #[test]
    fn test_shutdown_sends_zero_torque_then_stop() {
        let (shared, mut bus, handle) = setup(FreshnessPolicy::Disabled);
        bus.shutdown(&shared);

        let sent = handle.sent_frames();
        assert_eq!(command_types(&sent), vec![CONTROL, CONTROL, STOP, STOP]);
        let type01 = ActuatorType::Type01.config();
        assert_eq!(sent[0], ControlCommand::default().to_frame(1, type01));
        assert_eq!(
            sent[0].arbitration_id().unwrap().data_field,
            robstride_protocol::encode(0.0, type01.torque)
        );
        assert!(handle.is_closed());
    }

    #[test]
    fn test_freshness_policy_default() {
        assert_eq!(
            FreshnessPolicy::default(),
            FreshnessPolicy::Timeout(Duration::from_millis(100))
        );
        let config = SupervisorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.control_queue_capacity, 64);
    }
}
