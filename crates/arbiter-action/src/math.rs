//! 角度工具

/// 把角度归一化到 `[-180, 180)`
pub fn normalize_deg(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a >= 180.0 {
        a - 360.0
    } else if a < -180.0 {
        a + 360.0
    } else {
        a
    }
}

/// 两个航向的差 `a - b`，归一化到 `[-180, 180)`
pub fn sub_angle(a: f64, b: f64) -> f64 {
    normalize_deg(a - b)
}
