// crates/bw_physics/src/schemes/reconstruction.rs

//! MUSCL 重构
//!
//! 对每个单元沿三个方向做限制斜率的线性重构，得到六个偏向单元面的
//! 状态：Vl/Vr（x 负/正面）、Vb/Vt（y）、Vk/Vf（z）。重构在原始
//! 变量上逐分量进行；模板不完整处（幽灵盒边缘）退化为一阶。

use super::limiter::limited_slope;
use crate::state::Vec5;
use bw_config::{LimiterKind, SchemeConfig};
use bw_foundation::{Axis, Int3};
use bw_mesh::{Field3, SubDomain};

/// MUSCL 重构器
pub struct MusclReconstructor {
    limiter: LimiterKind,
    theta: f64,
}

impl MusclReconstructor {
    pub fn new(scheme: &SchemeConfig) -> Self {
        Self {
            limiter: scheme.limiter,
            theta: scheme.limiter_theta.clamp(1.0, 2.0),
        }
    }

    /// 重构六个面状态
    ///
    /// 输出场与 `v` 同盒；在幽灵盒内所有模板完整的位置有效。
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        &self,
        dom: &SubDomain,
        v: &Field3<Vec5>,
        vl: &mut Field3<Vec5>,
        vr: &mut Field3<Vec5>,
        vb: &mut Field3<Vec5>,
        vt: &mut Field3<Vec5>,
        vk: &mut Field3<Vec5>,
        vf: &mut Field3<Vec5>,
    ) {
        let bbox = dom.ghosted;
        for p in bbox.iter() {
            let vc = v[p];
            for axis in Axis::ALL {
                let pm = p.offset(axis, -1);
                let pp = p.offset(axis, 1);

                let mut slope = Vec5::ZERO;
                if bbox.contains(pm) && bbox.contains(pp) {
                    let vm = v[pm];
                    let vp = v[pp];
                    for n in 0..5 {
                        slope[n] =
                            limited_slope(self.limiter, self.theta, vc[n] - vm[n], vp[n] - vc[n]);
                    }
                }

                let minus = vc - slope * 0.5;
                let plus = vc + slope * 0.5;
                self.store(axis, p, minus, plus, vl, vr, vb, vt, vk, vf);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn store(
        &self,
        axis: Axis,
        p: Int3,
        minus: Vec5,
        plus: Vec5,
        vl: &mut Field3<Vec5>,
        vr: &mut Field3<Vec5>,
        vb: &mut Field3<Vec5>,
        vt: &mut Field3<Vec5>,
        vk: &mut Field3<Vec5>,
        vf: &mut Field3<Vec5>,
    ) {
        match axis {
            Axis::X => {
                vl[p] = minus;
                vr[p] = plus;
            }
            Axis::Y => {
                vb[p] = minus;
                vt[p] = plus;
            }
            Axis::Z => {
                vk[p] = minus;
                vf[p] = plus;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_config::SchemeConfig;
    use bw_mesh::GlobalMesh;
    use std::sync::Arc;

    fn setup(n: usize) -> (SubDomain, Field3<Vec5>) {
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, n, n, n).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let v = Field3::new(dom.ghosted, Vec5::ZERO);
        (dom, v)
    }

    fn fields(dom: &SubDomain) -> [Field3<Vec5>; 6] {
        std::array::from_fn(|_| Field3::new(dom.ghosted, Vec5::ZERO))
    }

    #[test]
    fn test_constant_field_reconstructs_to_itself() {
        let (dom, mut v) = setup(4);
        v.fill(Vec5::new(1.0, 0.5, 0.0, 0.0, 2.0));
        let [mut vl, mut vr, mut vb, mut vt, mut vk, mut vf] = fields(&dom);
        let rec = MusclReconstructor::new(&SchemeConfig::default());
        rec.reconstruct(&dom, &v, &mut vl, &mut vr, &mut vb, &mut vt, &mut vk, &mut vf);
        let p = Int3::new(2, 2, 2);
        assert_eq!(vl[p], v[p]);
        assert_eq!(vf[p], v[p]);
    }

    #[test]
    fn test_linear_profile_reconstructed_exactly() {
        let (dom, mut v) = setup(8);
        for p in dom.ghosted.iter() {
            v[p] = Vec5::new(1.0 + 0.1 * p.i as f64, 0.0, 0.0, 0.0, 1.0);
        }
        let [mut vl, mut vr, mut vb, mut vt, mut vk, mut vf] = fields(&dom);
        let rec = MusclReconstructor::new(&SchemeConfig::default());
        rec.reconstruct(&dom, &v, &mut vl, &mut vr, &mut vb, &mut vt, &mut vk, &mut vf);
        let p = Int3::new(4, 4, 4);
        // 线性场：面状态等于单元值 ± 斜率/2
        assert!((vl[p][0] - (v[p][0] - 0.05)).abs() < 1e-13);
        assert!((vr[p][0] - (v[p][0] + 0.05)).abs() < 1e-13);
        // y、z 方向无梯度
        assert_eq!(vb[p], v[p]);
        assert_eq!(vt[p], v[p]);
    }

    #[test]
    fn test_ghost_edge_falls_back_to_first_order() {
        let (dom, mut v) = setup(4);
        for p in dom.ghosted.iter() {
            v[p] = Vec5::new((p.i * p.i) as f64 + 1.0, 0.0, 0.0, 0.0, 1.0);
        }
        let [mut vl, mut vr, mut vb, mut vt, mut vk, mut vf] = fields(&dom);
        let rec = MusclReconstructor::new(&SchemeConfig::default());
        rec.reconstruct(&dom, &v, &mut vl, &mut vr, &mut vb, &mut vt, &mut vk, &mut vf);
        // 幽灵盒最外层（i=-1）没有 i-2 邻居：一阶
        let p = Int3::new(-1, 2, 2);
        assert_eq!(vl[p], v[p]);
        assert_eq!(vr[p], v[p]);
    }
}
