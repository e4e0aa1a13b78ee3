// crates/bw_foundation/src/quadrature.rs

//! 三角形 Gauss 积分
//!
//! 提供对称 Gauss 积分规则 (1/3/4/6 点)，积分点以重心坐标给出，
//! 权重归一化为 1（即对单位面积的权重和为 1）。

use crate::error::{BwError, BwResult};
use glam::DVec3;

/// 单个积分点：重心坐标 + 权重
#[derive(Debug, Clone, Copy)]
pub struct GaussPoint {
    /// 重心坐标 (λ1, λ2, λ3)，和为 1
    pub bary: DVec3,
    /// 权重，规则内权重和为 1
    pub weight: f64,
}

/// 返回 np 点对称规则
///
/// 支持 np ∈ {1, 3, 4, 6}；其他值返回错误。
pub fn triangle_gauss_rule(np: usize) -> BwResult<Vec<GaussPoint>> {
    let pts = match np {
        1 => vec![GaussPoint {
            bary: DVec3::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
            weight: 1.0,
        }],
        3 => {
            // 二阶精度的中点规则
            let w = 1.0 / 3.0;
            vec![
                GaussPoint { bary: DVec3::new(2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0), weight: w },
                GaussPoint { bary: DVec3::new(1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0), weight: w },
                GaussPoint { bary: DVec3::new(1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0), weight: w },
            ]
        }
        4 => {
            // 三阶精度（带负权中心点）
            let w0 = -27.0 / 48.0;
            let w1 = 25.0 / 48.0;
            vec![
                GaussPoint { bary: DVec3::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0), weight: w0 },
                GaussPoint { bary: DVec3::new(0.6, 0.2, 0.2), weight: w1 },
                GaussPoint { bary: DVec3::new(0.2, 0.6, 0.2), weight: w1 },
                GaussPoint { bary: DVec3::new(0.2, 0.2, 0.6), weight: w1 },
            ]
        }
        6 => {
            // 四阶精度的六点规则
            let a1 = 0.816847572980459;
            let b1 = 0.091576213509771;
            let a2 = 0.108103018168070;
            let b2 = 0.445948490915965;
            let w1 = 0.109951743655322;
            let w2 = 0.223381589678011;
            vec![
                GaussPoint { bary: DVec3::new(a1, b1, b1), weight: w1 },
                GaussPoint { bary: DVec3::new(b1, a1, b1), weight: w1 },
                GaussPoint { bary: DVec3::new(b1, b1, a1), weight: w1 },
                GaussPoint { bary: DVec3::new(a2, b2, b2), weight: w2 },
                GaussPoint { bary: DVec3::new(b2, a2, b2), weight: w2 },
                GaussPoint { bary: DVec3::new(b2, b2, a2), weight: w2 },
            ]
        }
        _ => {
            return Err(BwError::invalid_input(format!(
                "Unknown Gauss quadrature rule ({np} points)"
            )))
        }
    };
    Ok(pts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for np in [1usize, 3, 4, 6] {
            let rule = triangle_gauss_rule(np).unwrap();
            assert_eq!(rule.len(), np);
            let sum: f64 = rule.iter().map(|g| g.weight).sum();
            assert!((sum - 1.0).abs() < 1e-12, "np={np}, sum={sum}");
        }
    }

    #[test]
    fn test_barycentric_coords_sum_to_one() {
        for np in [1usize, 3, 4, 6] {
            for g in triangle_gauss_rule(np).unwrap() {
                let s = g.bary.x + g.bary.y + g.bary.z;
                assert!((s - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_linear_function_integrated_exactly() {
        // f = λ1 在单位三角形上的平均值是 1/3
        for np in [1usize, 3, 4, 6] {
            let rule = triangle_gauss_rule(np).unwrap();
            let avg: f64 = rule.iter().map(|g| g.weight * g.bary.x).sum();
            assert!((avg - 1.0 / 3.0).abs() < 1e-12, "np={np}");
        }
    }

    #[test]
    fn test_unknown_rule_rejected() {
        assert!(triangle_gauss_rule(2).is_err());
        assert!(triangle_gauss_rule(7).is_err());
    }
}
