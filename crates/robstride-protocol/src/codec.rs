//! 定点编解码
//!
//! 线上格式没有浮点数：每个物理量都以其已知工作区间内的 16 位比例值传输。
//! `encode` 先钳位再线性映射到 `[0, 65535]` 并四舍五入；`decode` 是精确的反向映射。
//! 两者都是全函数，越界输入被钳位而不是报错。

/// 16 位定点数的满量程
pub const U16_FULL_SCALE: f64 = u16::MAX as f64;

/// 物理量的取值区间（不可变，`min < max`）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalRange {
    pub min: f64,
    pub max: f64,
}

impl PhysicalRange {
    /// 创建区间
    ///
    /// 静态表使用此构造器，`min < max` 由表的作者保证；
    /// 运行时构造请使用 [`PhysicalRange::try_new`]。
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 对称区间 `[-limit, limit]`
    pub const fn symmetric(limit: f64) -> Self {
        Self::new(-limit, limit)
    }

    /// 校验 `min < max` 后创建区间
    pub fn try_new(min: f64, max: f64) -> Option<Self> {
        (min < max).then_some(Self { min, max })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// 钳位到区间内（NaN 映射为 `min`）
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// 一个量化步长，即 `decode(encode(v))` 的最大误差
    pub fn resolution(&self) -> f64 {
        self.span() / U16_FULL_SCALE
    }
}

/// 物理值 -> 16 位定点数
pub fn encode(value: f64, range: PhysicalRange) -> u16 {
    let normalized = (range.clamp(value) - range.min) / range.span();
    (normalized * U16_FULL_SCALE).round().clamp(0.0, U16_FULL_SCALE) as u16
}

/// 16 位定点数 -> 物理值
pub fn decode(raw: u16, range: PhysicalRange) -> f64 {
    raw as f64 / U16_FULL_SCALE * range.span() + range.min
}
