// crates/bw_physics/src/schemes/limiter.rs

//! 斜率限制器
//!
//! MUSCL 重构使用的一维限制器，逐分量作用于相邻差分。

use bw_config::LimiterKind;

/// 限制后的斜率
///
/// `dm = V_i - V_{i-1}`，`dp = V_{i+1} - V_i`。
#[inline]
pub fn limited_slope(kind: LimiterKind, theta: f64, dm: f64, dp: f64) -> f64 {
    match kind {
        LimiterKind::GeneralizedMinmod => minmod3(theta * dm, 0.5 * (dm + dp), theta * dp),
        LimiterKind::VanAlbada => van_albada(dm, dp),
        LimiterKind::None => 0.0,
    }
}

#[inline]
fn minmod2(a: f64, b: f64) -> f64 {
    if a * b <= 0.0 {
        0.0
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}

#[inline]
fn minmod3(a: f64, b: f64, c: f64) -> f64 {
    minmod2(a, minmod2(b, c))
}

#[inline]
fn van_albada(dm: f64, dp: f64) -> f64 {
    const EPS: f64 = 1e-14;
    if dm * dp <= 0.0 {
        return 0.0;
    }
    ((dp * dp + EPS) * dm + (dm * dm + EPS) * dp) / (dm * dm + dp * dp + 2.0 * EPS)
}
