//! 单通道期望值
//!
//! 每个通道携带一个数值和一个强度。强度越大，合并时话语权越大；
//! `allow_override` 为真时通道按覆盖策略取最小 / 最大值，而不是加权平均。

use tracing::warn;

/// 无贡献
pub const NO_STRENGTH: f64 = 0.0;
/// 最小有效强度，低于此值视为无贡献
pub const MIN_STRENGTH: f64 = 0.000_001;
/// 最大强度
pub const MAX_STRENGTH: f64 = 1.0;

/// 覆盖策略：多个硬限制同时生效时取哪一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverridePolicy {
    /// 取最小值（最严格的速度上限）
    #[default]
    Min,
    /// 取最大值（最快的减速度 / 最慢的倒车速度）
    Max,
}

impl OverridePolicy {
    fn pick(self, a: f64, b: f64) -> f64 {
        match self {
            OverridePolicy::Min => a.min(b),
            OverridePolicy::Max => a.max(b),
        }
    }
}

/// 期望通道
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesireChannel {
    value: f64,
    strength: f64,
    allow_override: bool,
    policy: OverridePolicy,
    // 三阶段平均的累加器
    value_total: f64,
    strength_total: f64,
}

impl DesireChannel {
    pub const fn new(policy: OverridePolicy) -> Self {
        Self {
            value: 0.0,
            strength: NO_STRENGTH,
            allow_override: true,
            policy,
            value_total: 0.0,
            strength_total: NO_STRENGTH,
        }
    }

    /// 重置为无贡献
    ///
    /// `allow_override` 复位为真，这样第一个贡献者的标志决定合并结果。
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// 设置期望值
    ///
    /// 强度超过 [`MAX_STRENGTH`] 截断；低于 [`MIN_STRENGTH`] 视为 [`NO_STRENGTH`]。
    pub fn set(&mut self, value: f64, strength: f64, allow_override: bool) {
        self.value = value;
        self.allow_override = allow_override;
        self.strength = clamp_strength(strength);
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn allow_override(&self) -> bool {
        self.allow_override
    }

    pub fn policy(&self) -> OverridePolicy {
        self.policy
    }

    /// 是否携带有效强度
    pub fn is_set(&self) -> bool {
        self.strength >= MIN_STRENGTH
    }

    /// 平均过程中已累计的强度
    pub fn average_strength(&self) -> f64 {
        self.strength_total
    }

    /// 按优先级合并另一个通道
    ///
    /// 先合并者的强度保持不变，总强度超出 [`MAX_STRENGTH`] 的部分从后合并者扣除。
    pub fn merge(&mut self, other: &DesireChannel) {
        let old_strength = self.strength;
        let mut other_strength = other.strength;
        if old_strength + other_strength > MAX_STRENGTH {
            other_strength = MAX_STRENGTH - old_strength;
        }
        self.allow_override = self.allow_override && other.allow_override;

        if other.strength < MIN_STRENGTH {
            return;
        }
        self.strength = old_strength + other_strength;

        if self.allow_override && self.strength >= MIN_STRENGTH {
            if old_strength >= MIN_STRENGTH {
                self.value = self.policy.pick(self.value, other.value);
            } else {
                self.value = other.value;
            }
        } else if self.strength >= MIN_STRENGTH && other_strength > 0.0 {
            self.value =
                (old_strength * self.value + other.value * other_strength) / self.strength;
        }
    }

    /// 开始三阶段平均
    pub fn start_average(&mut self) {
        self.value_total = self.value * self.strength;
        self.strength_total = self.strength;
    }

    /// 累加一个参与平均的通道
    ///
    /// 覆盖模式下同步跟踪最小 / 最大值，平均结束时若仍允许覆盖则采用它。
    pub fn add_average(&mut self, other: &DesireChannel) {
        self.allow_override = self.allow_override && other.allow_override;
        if self.allow_override && other.strength >= MIN_STRENGTH {
            if self.strength_total >= MIN_STRENGTH {
                self.value = self.policy.pick(self.value, other.value);
            } else {
                self.value = other.value;
            }
        }
        self.value_total += other.value * other.strength;
        self.strength_total += other.strength;
    }

    /// 结束三阶段平均
    pub fn end_average(&mut self) {
        if self.strength_total < MIN_STRENGTH {
            self.strength = NO_STRENGTH;
            return;
        }
        if !self.allow_override {
            self.value = self.value_total / self.strength_total;
        }
        self.strength = self.strength_total.min(MAX_STRENGTH);
    }

    /// 下界检查：取整后的值低于 `bound` 时截断并告警
    ///
    /// 返回是否发生了截断。
    pub fn check_lower_bound(&mut self, behavior: &str, label: &str, bound: f64) -> bool {
        if self.strength < MIN_STRENGTH || self.value.round() >= bound {
            return false;
        }
        warn!(
            "Sanity check: '{}' set {} to {} with strength {} (lower bound is {}, clamping)",
            behavior, label, self.value, self.strength, bound
        );
        self.value = bound;
        true
    }

    /// 上界检查：取整后的值高于 `bound` 时截断并告警
    pub fn check_upper_bound(&mut self, behavior: &str, label: &str, bound: f64) -> bool {
        if self.strength < MIN_STRENGTH || self.value.round() <= bound {
            return false;
        }
        warn!(
            "Sanity check: '{}' set {} to {} with strength {} (upper bound is {}, clamping)",
            behavior, label, self.value, self.strength, bound
        );
        self.value = bound;
        true
    }
}

impl Default for DesireChannel {
    fn default() -> Self {
        Self::new(OverridePolicy::Min)
    }
}

fn clamp_strength(strength: f64) -> f64 {
    if strength > MAX_STRENGTH {
        MAX_STRENGTH
    } else if strength < MIN_STRENGTH || strength.is_nan() {
        NO_STRENGTH
    } else {
        strength
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan(value: f64, strength: f64, allow_override: bool) -> DesireChannel {
        let mut c = DesireChannel::default();
        c.set(value, strength, allow_override);
        c
    }

    #[test]
    fn test_set_clamps_strength() {
        assert_eq!(chan(1.0, 5.0, false).strength(), MAX_STRENGTH);
        assert_eq!(chan(1.0, 1e-9, false).strength(), NO_STRENGTH);
        assert_eq!(chan(1.0, -1.0, false).strength(), NO_STRENGTH);
        assert_eq!(chan(1.0, f64::NAN, false).strength(), NO_STRENGTH);
        assert_eq!(chan(1.0, 0.4, false).strength(), 0.4);
    }

    #[test]
    fn test_reset() {
        let mut c = chan(3.0, 0.5, false);
        c.reset();
        assert_eq!(c.value(), 0.0);
        assert_eq!(c.strength(), NO_STRENGTH);
        assert!(c.allow_override());
    }

    #[test]
    fn test_merge_into_empty_takes_value() {
        let mut acc = DesireChannel::default();
        acc.merge(&chan(500.0, 1.0, false));
        assert_eq!(acc.value(), 500.0);
        assert_eq!(acc.strength(), 1.0);
        assert!(!acc.allow_override());
    }

    #[test]
    fn test_merge_weighted_mean_under_cap() {
        let mut acc = chan(100.0, 0.25, false);
        acc.merge(&chan(300.0, 0.5, false));
        assert!((acc.value() - (0.25 * 100.0 + 0.5 * 300.0) / 0.75).abs() < 1e-9);
        assert!((acc.strength() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_merge_over_cap_reduces_second_contributor() {
        let mut acc = chan(100.0, 0.75, false);
        acc.merge(&chan(300.0, 0.5, false));
        // 第二个贡献者的强度被削减为 0.25
        assert!((acc.value() - (0.75 * 100.0 + 0.25 * 300.0)).abs() < 1e-9);
        assert_eq!(acc.strength(), MAX_STRENGTH);
    }

    #[test]
    fn test_merge_saturated_accumulator_ignores_mean_contribution() {
        let mut acc = chan(100.0, 1.0, false);
        acc.merge(&chan(300.0, 1.0, false));
        assert_eq!(acc.value(), 100.0);
        assert_eq!(acc.strength(), MAX_STRENGTH);
    }

    #[test]
    fn test_merge_override_min() {
        let mut acc = chan(800.0, 0.5, true);
        acc.merge(&chan(300.0, 0.2, true));
        assert_eq!(acc.value(), 300.0);
        acc.merge(&chan(500.0, 0.2, true));
        assert_eq!(acc.value(), 300.0);
    }

    #[test]
    fn test_merge_override_max_policy() {
        let mut acc = DesireChannel::new(OverridePolicy::Max);
        acc.merge(&chan(200.0, 1.0, true));
        acc.merge(&chan(900.0, 1.0, true));
        assert_eq!(acc.value(), 900.0);
    }

    #[test]
    fn test_merge_override_requires_both_sides() {
        let mut acc = chan(800.0, 0.5, false);
        acc.merge(&chan(300.0, 0.5, true));
        assert!(!acc.allow_override());
        assert!((acc.value() - 550.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_empty_is_identity() {
        let mut acc = chan(123.456, 0.37, false);
        let before = acc;
        acc.merge(&DesireChannel::default());
        assert_eq!(acc, before);
    }

    #[test]
    fn test_average_override_tracks_min_in_any_order() {
        for order in [[800.0, 500.0, 300.0], [300.0, 500.0, 800.0], [500.0, 300.0, 800.0]] {
            let mut acc = DesireChannel::default();
            acc.start_average();
            for v in order {
                acc.add_average(&chan(v, 1.0, true));
            }
            acc.end_average();
            assert_eq!(acc.value(), 300.0, "order {:?}", order);
            assert_eq!(acc.strength(), MAX_STRENGTH);
        }
    }

    #[test]
    fn test_average_weighted_mean() {
        let mut acc = DesireChannel::default();
        acc.start_average();
        acc.add_average(&chan(100.0, 0.2, false));
        acc.add_average(&chan(400.0, 0.2, false));
        acc.end_average();
        assert!((acc.value() - 250.0).abs() < 1e-9);
        assert!((acc.strength() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_average_without_strength_is_no_strength() {
        let mut acc = DesireChannel::default();
        acc.start_average();
        acc.add_average(&chan(100.0, 0.0, false));
        acc.end_average();
        assert_eq!(acc.strength(), NO_STRENGTH);
    }

    #[test]
    fn test_bounds_clamp() {
        let mut c = chan(-20.0, 1.0, true);
        assert!(c.check_lower_bound("test", "max vel", 0.0));
        assert_eq!(c.value(), 0.0);
        assert!(!c.check_lower_bound("test", "max vel", 0.0));

        let mut c = chan(10.4, 1.0, true);
        // 取整后等于上界，不截断
        assert!(!c.check_upper_bound("test", "max neg vel", 10.0));
        assert_eq!(c.value(), 10.4);

        let mut c = chan(-50.0, NO_STRENGTH, true);
        assert!(!c.check_lower_bound("test", "max vel", 0.0));
        assert_eq!(c.value(), -50.0);
    }
}
