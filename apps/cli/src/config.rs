//! TOML 配置文件
//!
//! ```toml
//! [supervisor]
//! poll_interval_ms = 5
//! freshness_timeout_ms = 100
//!
//! [[actuators]]
//! id = 1
//! type = "01"
//! interface = "can0"
//! kp = 20.0
//! kd = 1.0
//! ```

use crate::utils::validate_actuator_id;
use anyhow::{Context, Result, bail};
use robstride_driver::{ActuatorConfig, FreshnessPolicy, SupervisorConfig};
use robstride_protocol::ActuatorType;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 配置文件根结构
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub actuators: Vec<ActuatorEntry>,
}

/// `[supervisor]`，缺省字段使用 `SupervisorConfig::default()`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    pub poll_interval_ms: Option<u64>,
    pub recv_timeout_ms: Option<u64>,
    /// 0 表示每个 tick 都检查，不设置表示使用默认超时
    pub freshness_timeout_ms: Option<u64>,
    pub max_drain_per_tick: Option<usize>,
    pub control_queue_capacity: Option<usize>,
    pub host_id: Option<u8>,
}

/// `[[actuators]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuatorEntry {
    pub id: u8,
    #[serde(rename = "type")]
    pub actuator_type: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub kd: f64,
    pub max_torque: Option<f64>,
    pub max_velocity: Option<f64>,
    pub max_angle_change: Option<f64>,
    /// 运控帧的最高发送频率（Hz）
    pub command_rate_hz: Option<f64>,
}

fn default_interface() -> String {
    "can0".to_string()
}

/// 解析后的配置：接口列表（按首次出现的顺序）与执行器注册信息
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub supervisor: SupervisorConfig,
    pub host_id: u8,
    pub interfaces: Vec<String>,
    pub actuators: Vec<ResolvedActuator>,
}

#[derive(Debug, Clone)]
pub struct ResolvedActuator {
    pub config: ActuatorConfig,
    pub kp: f64,
    pub kd: f64,
    pub max_torque: Option<f64>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.actuators.is_empty() {
            bail!("no [[actuators]] configured");
        }

        let s = &self.supervisor;
        let defaults = SupervisorConfig::default();
        let supervisor = SupervisorConfig {
            poll_interval: s
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            recv_timeout: s
                .recv_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.recv_timeout),
            freshness: match s.freshness_timeout_ms {
                Some(0) => FreshnessPolicy::EveryTick,
                Some(ms) => FreshnessPolicy::Timeout(Duration::from_millis(ms)),
                None => defaults.freshness,
            },
            max_drain_per_tick: s.max_drain_per_tick.unwrap_or(defaults.max_drain_per_tick),
            control_queue_capacity: s
                .control_queue_capacity
                .unwrap_or(defaults.control_queue_capacity),
            join_timeout: defaults.join_timeout,
        };
        if supervisor.poll_interval.is_zero() {
            bail!("poll_interval_ms must be greater than 0");
        }

        let mut interfaces: Vec<String> = Vec::new();
        let mut actuators = Vec::with_capacity(self.actuators.len());
        for entry in &self.actuators {
            let id = validate_actuator_id(entry.id)?;
            let actuator_type: ActuatorType = entry
                .actuator_type
                .parse()
                .with_context(|| format!("actuator {id}"))?;
            let transport = match interfaces.iter().position(|i| i == &entry.interface) {
                Some(index) => index,
                None => {
                    interfaces.push(entry.interface.clone());
                    interfaces.len() - 1
                },
            };

            let mut config = ActuatorConfig::new(id, actuator_type).on_transport(transport);
            if let Some(v) = entry.max_velocity {
                config = config.with_max_velocity(v);
            }
            if let Some(a) = entry.max_angle_change {
                config = config.with_max_angle_change(a);
            }
            if let Some(rate) = entry.command_rate_hz {
                config = config.with_command_rate(rate);
            }
            actuators.push(ResolvedActuator {
                config,
                kp: entry.kp,
                kd: entry.kd,
                max_torque: entry.max_torque,
            });
        }

        Ok(ResolvedConfig {
            supervisor,
            host_id: s.host_id.unwrap_or(robstride_protocol::DEFAULT_HOST_ID),
            interfaces,
            actuators,
        })
    }
}
