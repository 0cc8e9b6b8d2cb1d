//! 执行器型号与静态物理参数表

use crate::codec::PhysicalRange;
use crate::params;
use std::fmt;
use std::str::FromStr;

/// 超时参数写入值 = round(秒 * TIMEOUT_FACTOR)
pub const DEFAULT_TIMEOUT_FACTOR: f64 = 20.0;

/// 执行器型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActuatorType {
    Type01,
    Type02,
    Type03,
    Type04,
}

/// 每种型号的常量配置，进程生命周期内只读
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorTypeConfig {
    pub position: PhysicalRange,
    pub velocity: PhysicalRange,
    pub kp: PhysicalRange,
    pub kd: PhysicalRange,
    pub torque: PhysicalRange,
    /// 初始化时是否需要先设置机械零位
    pub zero_on_init: bool,
    /// CAN 超时参数的索引
    pub timeout_command_code: u16,
    pub timeout_factor: f64,
}

const POSITION_RANGE: PhysicalRange = PhysicalRange::symmetric(12.5);

static TYPE_TABLE: [(ActuatorType, ActuatorTypeConfig); 4] = [
    (
        ActuatorType::Type01,
        ActuatorTypeConfig {
            position: POSITION_RANGE,
            velocity: PhysicalRange::symmetric(44.0),
            kp: PhysicalRange::new(0.0, 500.0),
            kd: PhysicalRange::new(0.0, 5.0),
            torque: PhysicalRange::symmetric(12.0),
            zero_on_init: true,
            timeout_command_code: params::CAN_TIMEOUT_TYPE01,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
        },
    ),
    (
        ActuatorType::Type02,
        ActuatorTypeConfig {
            position: POSITION_RANGE,
            velocity: PhysicalRange::symmetric(44.0),
            kp: PhysicalRange::new(0.0, 500.0),
            kd: PhysicalRange::new(0.0, 5.0),
            torque: PhysicalRange::symmetric(12.0),
            zero_on_init: false,
            timeout_command_code: params::CAN_TIMEOUT,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
        },
    ),
    (
        ActuatorType::Type03,
        ActuatorTypeConfig {
            position: POSITION_RANGE,
            velocity: PhysicalRange::symmetric(20.0),
            kp: PhysicalRange::new(0.0, 5000.0),
            kd: PhysicalRange::new(0.0, 100.0),
            torque: PhysicalRange::symmetric(60.0),
            zero_on_init: false,
            timeout_command_code: params::CAN_TIMEOUT,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
        },
    ),
    (
        ActuatorType::Type04,
        ActuatorTypeConfig {
            position: POSITION_RANGE,
            velocity: PhysicalRange::symmetric(15.0),
            kp: PhysicalRange::new(0.0, 5000.0),
            kd: PhysicalRange::new(0.0, 100.0),
            torque: PhysicalRange::symmetric(120.0),
            zero_on_init: false,
            timeout_command_code: params::CAN_TIMEOUT,
            timeout_factor: DEFAULT_TIMEOUT_FACTOR,
        },
    ),
];

impl ActuatorType {
    pub const ALL: [ActuatorType; 4] = [
        ActuatorType::Type01,
        ActuatorType::Type02,
        ActuatorType::Type03,
        ActuatorType::Type04,
    ];

    /// 查静态表
    pub fn config(self) -> &'static ActuatorTypeConfig {
        // 表按枚举顺序排列
        &TYPE_TABLE[self as usize].1
    }

    /// CAN 超时秒数 -> 参数写入值
    pub fn timeout_raw(self, seconds: f64) -> u32 {
        let cfg = self.config();
        (seconds.max(0.0) * cfg.timeout_factor).round() as u32
    }

    /// 参数读回值 -> CAN 超时秒数
    pub fn timeout_seconds(self, raw: u32) -> f64 {
        raw as f64 / self.config().timeout_factor
    }
}

impl fmt::Display for ActuatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActuatorType::Type01 => "robstride01",
            ActuatorType::Type02 => "robstride02",
            ActuatorType::Type03 => "robstride03",
            ActuatorType::Type04 => "robstride04",
        };
        f.write_str(name)
    }
}

/// 未知的型号字符串
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown actuator type: {0}")]
pub struct UnknownActuatorType(pub String);

impl FromStr for ActuatorType {
    type Err = UnknownActuatorType;

    /// 接受 `01` / `type01` / `robstride01`，不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower
            .strip_prefix("robstride")
            .or_else(|| lower.strip_prefix("type"))
            .unwrap_or(&lower);
        match digits.trim_start_matches('0') {
            "1" => Ok(ActuatorType::Type01),
            "2" => Ok(ActuatorType::Type02),
            "3" => Ok(ActuatorType::Type03),
            "4" => Ok(ActuatorType::Type04),
            _ => Err(UnknownActuatorType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_enum() {
        for ty in ActuatorType::ALL {
            assert_eq!(TYPE_TABLE[ty as usize].0, ty);
        }
    }

    #[test]
    fn test_table_ranges_are_valid() {
        for ty in ActuatorType::ALL {
            let cfg = ty.config();
            for range in [cfg.position, cfg.velocity, cfg.kp, cfg.kd, cfg.torque] {
                assert!(range.min < range.max, "{ty}: {range:?}");
            }
        }
    }

    #[test]
    fn test_type01_limits() {
        let cfg = ActuatorType::Type01.config();
        assert_eq!(cfg.torque, PhysicalRange::new(-12.0, 12.0));
        assert_eq!(cfg.velocity.max, 44.0);
        assert!(cfg.zero_on_init);
        assert_eq!(cfg.timeout_command_code, 0x200C);
    }

    #[test]
    fn test_type04_limits() {
        let cfg = ActuatorType::Type04.config();
        assert_eq!(cfg.torque.max, 120.0);
        assert_eq!(cfg.kp.max, 5000.0);
        assert!(!cfg.zero_on_init);
        assert_eq!(cfg.timeout_command_code, 0x200B);
    }

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(ActuatorType::Type02.timeout_raw(0.5), 10);
        assert_eq!(ActuatorType::Type02.timeout_raw(-1.0), 0);
        assert_eq!(ActuatorType::Type02.timeout_seconds(10), 0.5);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("01".parse::<ActuatorType>().unwrap(), ActuatorType::Type01);
        assert_eq!("Type03".parse::<ActuatorType>().unwrap(), ActuatorType::Type03);
        assert_eq!(
            "RobStride04".parse::<ActuatorType>().unwrap(),
            ActuatorType::Type04
        );
        assert!("robstride09".parse::<ActuatorType>().is_err());
        assert!("".parse::<ActuatorType>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for ty in ActuatorType::ALL {
            assert_eq!(ty.to_string().parse::<ActuatorType>().unwrap(), ty);
        }
    }
}
