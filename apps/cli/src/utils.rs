//! 工具函数

use anyhow::{Context, Result, bail};
use robstride_can::Transport;
use robstride_driver::{ActuatorState, MetricsSnapshot};
use robstride_protocol::{ActuatorType, MAX_ACTUATOR_ID};

/// 解析 `id:type` 列表，如 `1:01,2:04`
pub fn parse_actuator_list(input: &str) -> Result<Vec<(u8, ActuatorType)>> {
    let mut actuators = Vec::new();
    for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, ty) = item
            .split_once(':')
            .with_context(|| format!("expected id:type, got '{item}'"))?;
        let id = parse_actuator_id(id)?;
        let ty: ActuatorType = ty.trim().parse()?;
        if actuators.iter().any(|&(existing, _)| existing == id) {
            bail!("actuator id {id} listed twice");
        }
        actuators.push((id, ty));
    }
    if actuators.is_empty() {
        bail!("no actuators given");
    }
    Ok(actuators)
}

/// 解析执行器 ID（支持十进制和 0x 前缀的十六进制）
pub fn parse_actuator_id(input: &str) -> Result<u8> {
    let input = input.trim();
    let id = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    }
    .with_context(|| format!("invalid actuator id '{input}'"))?;
    validate_actuator_id(id)
}

/// 执行器 ID 必须在 1..=254 之内（0 为主机，255 保留）
pub fn validate_actuator_id(id: u8) -> Result<u8> {
    if id == 0 || id > MAX_ACTUATOR_ID {
        bail!("actuator id {id} out of range 1..={MAX_ACTUATOR_ID}");
    }
    Ok(id)
}

/// 打开 SocketCAN 接口
#[cfg(target_os = "linux")]
pub fn open_interface(interface: &str) -> Result<Box<dyn Transport>> {
    let transport = robstride_can::SocketCanTransport::open(interface)
        .with_context(|| format!("failed to open CAN interface '{interface}'"))?;
    Ok(Box::new(transport))
}

#[cfg(not(target_os = "linux"))]
pub fn open_interface(interface: &str) -> Result<Box<dyn Transport>> {
    bail!("SocketCAN interface '{interface}' is only available on Linux")
}

pub fn print_states(states: &[ActuatorState]) {
    println!(
        "{:>4}  {:>7}  {:>10}  {:>10}  {:>9}  {:>7}  {:<11}  faults",
        "id", "online", "pos(rad)", "vel(rad/s)", "torque", "temp", "mode"
    );
    for s in states {
        println!(
            "{:>4}  {:>7}  {:>10.4}  {:>10.4}  {:>9.3}  {:>7.1}  {:<11}  0x{:02X}",
            s.actuator_id,
            if s.online { "yes" } else { "no" },
            s.position,
            s.velocity,
            s.torque,
            s.temperature,
            format!("{:?}", s.mode),
            s.faults.bits()
        );
    }
}

pub fn print_metrics(metrics: &MetricsSnapshot) {
    println!(
        "📊 ticks={} rate={:.1}Hz sent={} received={} coalesced={} dropped={} decode_errors={} send_errors={} recv_errors={} offline={}",
        metrics.ticks,
        metrics.update_rate_hz,
        metrics.frames_sent,
        metrics.frames_received,
        metrics.commands_coalesced,
        metrics.commands_dropped,
        metrics.decode_errors,
        metrics.send_errors,
        metrics.recv_errors,
        metrics.offline_transitions
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actuator_list() {
        let list = parse_actuator_list("1:01, 2:robstride04,0x0A:type03").unwrap();
        assert_eq!(
            list,
            vec![
                (1, ActuatorType::Type01),
                (2, ActuatorType::Type04),
                (10, ActuatorType::Type03)
            ]
        );
    }

    #[test]
    fn test_parse_actuator_list_errors() {
        assert!(parse_actuator_list("").is_err());
        assert!(parse_actuator_list("1").is_err());
        assert!(parse_actuator_list("1:09").is_err());
        assert!(parse_actuator_list("1:01,1:02").is_err());
        assert!(parse_actuator_list("0:01").is_err());
    }

    #[test]
    fn test_parse_actuator_id() {
        assert_eq!(parse_actuator_id("254").unwrap(), 254);
        assert_eq!(parse_actuator_id("0x7f").unwrap(), 0x7F);
        assert!(parse_actuator_id("255").is_err());
        assert!(parse_actuator_id("abc").is_err());
    }
}
