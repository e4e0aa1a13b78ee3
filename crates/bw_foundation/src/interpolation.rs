// crates/bw_foundation/src/interpolation.rs

//! 插值工具

use glam::DVec3;

/// 三线性插值
///
/// 八个角点按 `c[k][j][i]` 排列（i 最内层），`xi` 为单位立方体内的
/// 局部坐标 (ξ, η, ζ) ∈ [0,1]³。
#[inline]
pub fn trilinear(c: [f64; 8], xi: DVec3) -> f64 {
    let (x, y, z) = (xi.x, xi.y, xi.z);
    let c00 = c[0] * (1.0 - x) + c[1] * x;
    let c10 = c[2] * (1.0 - x) + c[3] * x;
    let c01 = c[4] * (1.0 - x) + c[5] * x;
    let c11 = c[6] * (1.0 - x) + c[7] * x;
    let c0 = c00 * (1.0 - y) + c10 * y;
    let c1 = c01 * (1.0 - y) + c11 * y;
    c0 * (1.0 - z) + c1 * z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_reproduced() {
        let c = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(trilinear(c, DVec3::new(0.0, 0.0, 0.0)), 1.0);
        assert_eq!(trilinear(c, DVec3::new(1.0, 0.0, 0.0)), 2.0);
        assert_eq!(trilinear(c, DVec3::new(0.0, 1.0, 0.0)), 3.0);
        assert_eq!(trilinear(c, DVec3::new(1.0, 1.0, 1.0)), 8.0);
    }

    #[test]
    fn test_center_is_mean() {
        let c = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let v = trilinear(c, DVec3::new(0.5, 0.5, 0.5));
        assert!((v - 4.5).abs() < 1e-14);
    }

    #[test]
    fn test_constant_field() {
        let v = trilinear([2.5; 8], DVec3::new(0.3, 0.7, 0.1));
        assert!((v - 2.5).abs() < 1e-14);
    }
}
