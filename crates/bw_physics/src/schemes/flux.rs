// crates/bw_physics/src/schemes/flux.rs

//! 欧拉方程通量
//!
//! 物理通量、各轴最大特征速度，以及同材料单元面上的数值通量
//! （Roe / HLLC / 局部 Lax–Friedrichs）。Roe 平均出现非物理声速
//! 或 HLLC 分母退化时回退到 LLF。

use crate::eos::EquationOfState;
use crate::state::Vec5;
use bw_foundation::Axis;
use glam::DVec3;

/// 物理通量 F/G/H（由轴选择）
pub fn physical_flux(axis: Axis, v: &Vec5, eos: &dyn EquationOfState) -> Vec5 {
    let d = axis.index();
    let rho = v.rho();
    let vel = v.velocity();
    let p = v.pressure();
    let un = vel[d];
    let e = eos.internal_energy(rho, p);
    let total = rho * (e + 0.5 * vel.length_squared());

    let mut f = Vec5::new(rho * un, rho * un * vel.x, rho * un * vel.y, rho * un * vel.z, (total + p) * un);
    f[1 + d] += p;
    f
}

/// 各轴最大特征速度 (|u|+c, |v|+c, |w|+c)
pub fn max_eigenvalues(v: &Vec5, eos: &dyn EquationOfState) -> DVec3 {
    let c = eos.sound_speed(v.rho(), v.pressure());
    let vel = v.velocity();
    DVec3::new(vel.x.abs() + c, vel.y.abs() + c, vel.z.abs() + c)
}

/// 数值通量种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericalFlux {
    Roe,
    Hllc,
    Llf,
}

impl From<bw_config::FluxKind> for NumericalFlux {
    fn from(kind: bw_config::FluxKind) -> Self {
        match kind {
            bw_config::FluxKind::Roe => NumericalFlux::Roe,
            bw_config::FluxKind::Hllc => NumericalFlux::Hllc,
            bw_config::FluxKind::Llf => NumericalFlux::Llf,
        }
    }
}

/// 同材料单元面上的数值通量
///
/// `vm` 为面负侧（来自左单元的重构），`vp` 为正侧。
pub fn numerical_flux(
    kind: NumericalFlux,
    axis: Axis,
    vm: &Vec5,
    vp: &Vec5,
    eos: &dyn EquationOfState,
) -> Vec5 {
    match kind {
        NumericalFlux::Llf => llf(axis, vm, vp, eos),
        NumericalFlux::Hllc => hllc(axis, vm, vp, eos),
        NumericalFlux::Roe => roe(axis, vm, vp, eos),
    }
}

fn llf(axis: Axis, vm: &Vec5, vp: &Vec5, eos: &dyn EquationOfState) -> Vec5 {
    let d = axis.index();
    let fm = physical_flux(axis, vm, eos);
    let fp = physical_flux(axis, vp, eos);
    let am = max_eigenvalues(vm, eos)[d];
    let ap = max_eigenvalues(vp, eos)[d];
    let a = am.max(ap);
    let um = eos.primitive_to_conservative(vm);
    let up = eos.primitive_to_conservative(vp);
    (fm + fp) * 0.5 - (up - um) * (0.5 * a)
}

fn hllc(axis: Axis, vm: &Vec5, vp: &Vec5, eos: &dyn EquationOfState) -> Vec5 {
    let d = axis.index();
    let ni = 1 + d;

    let (rl, pl) = (vm.rho(), vm.pressure());
    let (rr, pr) = (vp.rho(), vp.pressure());
    let ul = vm[ni];
    let ur = vp[ni];
    let cl = eos.sound_speed(rl, pl);
    let cr = eos.sound_speed(rr, pr);

    // Davis 波速估计
    let sl = (ul - cl).min(ur - cr);
    let sr = (ul + cl).max(ur + cr);

    if sl >= 0.0 {
        return physical_flux(axis, vm, eos);
    }
    if sr <= 0.0 {
        return physical_flux(axis, vp, eos);
    }

    let denom = rl * (sl - ul) - rr * (sr - ur);
    if denom.abs() < 1e-14 || !denom.is_finite() {
        return llf(axis, vm, vp, eos);
    }
    let s_star = (pr - pl + rl * ul * (sl - ul) - rr * ur * (sr - ur)) / denom;
    if !s_star.is_finite() {
        return llf(axis, vm, vp, eos);
    }

    let (v, s, u_side) = if s_star >= 0.0 {
        (vm, sl, ul)
    } else {
        (vp, sr, ur)
    };
    let rho = v.rho();
    let p = v.pressure();
    let u_cons = eos.primitive_to_conservative(v);
    let f = physical_flux(axis, v, eos);

    let gap = s - u_side;
    let coef = rho * gap / (s - s_star);
    let mut u_star = Vec5::ZERO;
    u_star[0] = coef;
    u_star[1] = coef * v[1];
    u_star[2] = coef * v[2];
    u_star[3] = coef * v[3];
    u_star[ni] = coef * s_star;
    u_star[4] = coef * (u_cons[4] / rho + (s_star - u_side) * (s_star + p / (rho * gap)));

    f + (u_star - u_cons) * s
}

fn roe(axis: Axis, vm: &Vec5, vp: &Vec5, eos: &dyn EquationOfState) -> Vec5 {
    let d = axis.index();
    let t1 = (d + 1) % 3;
    let t2 = (d + 2) % 3;
    let gamma = eos.gamma();
    let q_ref = eos.reference_energy();

    let (rl, pl) = (vm.rho(), vm.pressure());
    let (rr, pr) = (vp.rho(), vp.pressure());
    let uvl = vm.velocity();
    let uvr = vp.velocity();

    let hl = {
        let e = eos.internal_energy(rl, pl);
        e + 0.5 * uvl.length_squared() + pl / rl
    };
    let hr = {
        let e = eos.internal_energy(rr, pr);
        e + 0.5 * uvr.length_squared() + pr / rr
    };

    // Roe 平均
    let s = (rr / rl).sqrt();
    let w = 1.0 / (1.0 + s);
    let uv = (uvl + uvr * s) * w;
    let h = (hl + hr * s) * w;
    let rho_bar = s * rl;

    let c2 = (gamma - 1.0) * (h - 0.5 * uv.length_squared() - q_ref);
    if c2 <= 0.0 || !c2.is_finite() {
        return llf(axis, vm, vp, eos);
    }
    let c = c2.sqrt();

    let un = uv[d];
    let dp = pr - pl;
    let drho = rr - rl;
    let dun = uvr[d] - uvl[d];

    // 波强
    let a1 = (dp - rho_bar * c * dun) / (2.0 * c2); // u - c
    let a2 = drho - dp / c2; // 熵波
    let a5 = (dp + rho_bar * c * dun) / (2.0 * c2); // u + c
    let at1 = rho_bar * (uvr[t1] - uvl[t1]); // 剪切
    let at2 = rho_bar * (uvr[t2] - uvl[t2]);

    // Harten 熵修正（声波）
    let delta = 0.05 * c;
    let fix = |lam: f64| {
        let a = lam.abs();
        if a < delta {
            (lam * lam + delta * delta) / (2.0 * delta)
        } else {
            a
        }
    };
    let l1 = fix(un - c);
    let l2 = un.abs();
    let l5 = fix(un + c);

    // 特征向量（轴对齐法向）
    let ke = 0.5 * uv.length_squared();
    let mut k1 = Vec5::ZERO;
    k1[0] = 1.0;
    k1[1] = uv.x;
    k1[2] = uv.y;
    k1[3] = uv.z;
    k1[1 + d] -= c;
    k1[4] = h - c * un;

    let mut k2 = Vec5::ZERO;
    k2[0] = 1.0;
    k2[1] = uv.x;
    k2[2] = uv.y;
    k2[3] = uv.z;
    k2[4] = ke + q_ref;

    let mut k5 = Vec5::ZERO;
    k5[0] = 1.0;
    k5[1] = uv.x;
    k5[2] = uv.y;
    k5[3] = uv.z;
    k5[1 + d] += c;
    k5[4] = h + c * un;

    let mut kt1 = Vec5::ZERO;
    kt1[1 + t1] = 1.0;
    kt1[4] = uv[t1];

    let mut kt2 = Vec5::ZERO;
    kt2[1 + t2] = 1.0;
    kt2[4] = uv[t2];

    let fm = physical_flux(axis, vm, eos);
    let fp = physical_flux(axis, vp, eos);

    let mut diss = k1 * (l1 * a1) + k2 * (l2 * a2) + k5 * (l5 * a5);
    diss += kt1 * (l2 * at1);
    diss += kt2 * (l2 * at2);

    (fm + fp) * 0.5 - diss * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eos::{MaterialSet, StiffenedGas};
    use bw_config::{EosConfig, MaterialConfig};

    fn air() -> StiffenedGas {
        StiffenedGas::new("air".into(), 1.4, 0.0, 1.0, 0.0, 1e-12, 1e-12, 1e-6)
    }

    fn mats() -> MaterialSet {
        MaterialSet::from_config(&[MaterialConfig {
            name: "air".into(),
            eos: EosConfig::StiffenedGas {
                gamma: 1.4,
                pressure_constant: 0.0,
                cv: 1.0,
                e_ref: 0.0,
            },
            rho_min: 1e-12,
            p_min: 1e-12,
            failsafe_density: 1e-6,
        }])
    }

    #[test]
    fn test_physical_flux_rest_state() {
        let eos = air();
        let v = Vec5::new(1.0, 0.0, 0.0, 0.0, 1.0);
        let f = physical_flux(Axis::X, &v, &eos);
        // 静止状态只剩压力项
        assert_eq!(f[0], 0.0);
        assert_eq!(f[1], 1.0);
        assert_eq!(f[4], 0.0);
    }

    #[test]
    fn test_consistency_all_fluxes() {
        // 一致性：F̂(V,V) = F(V)
        let ms = mats();
        let eos = ms.get(0);
        let v = Vec5::new(1.2, 0.4, -0.1, 0.2, 2.0);
        let exact = physical_flux(Axis::Y, &v, eos);
        for kind in [NumericalFlux::Llf, NumericalFlux::Hllc, NumericalFlux::Roe] {
            let f = numerical_flux(kind, Axis::Y, &v, &v, eos);
            for n in 0..5 {
                assert!(
                    (f[n] - exact[n]).abs() < 1e-10,
                    "{kind:?} component {n}: {} vs {}",
                    f[n],
                    exact[n]
                );
            }
        }
    }

    #[test]
    fn test_upwinding_supersonic() {
        // 超声速向右：所有通量取左状态
        let ms = mats();
        let eos = ms.get(0);
        let vl = Vec5::new(1.0, 5.0, 0.0, 0.0, 1.0);
        let vr = Vec5::new(0.5, 5.0, 0.0, 0.0, 0.5);
        let exact = physical_flux(Axis::X, &vl, eos);
        for kind in [NumericalFlux::Hllc, NumericalFlux::Roe] {
            let f = numerical_flux(kind, Axis::X, &vl, &vr, eos);
            for n in 0..5 {
                assert!((f[n] - exact[n]).abs() < 1e-9, "{kind:?} component {n}");
            }
        }
    }

    #[test]
    fn test_sod_face_flux_positive_mass() {
        // Sod 初始间断的面通量应向右输运质量
        let ms = mats();
        let eos = ms.get(0);
        let vl = Vec5::new(1.0, 0.0, 0.0, 0.0, 1.0);
        let vr = Vec5::new(0.125, 0.0, 0.0, 0.0, 0.1);
        for kind in [NumericalFlux::Llf, NumericalFlux::Hllc, NumericalFlux::Roe] {
            let f = numerical_flux(kind, Axis::X, &vl, &vr, eos);
            assert!(f[0].is_finite());
            // HLLC/Roe 的接触波速为正，质量通量为正；LLF 耗散亦给出正通量
            assert!(f[0] > 0.0, "{kind:?} mass flux {}", f[0]);
        }
    }

    #[test]
    fn test_max_eigenvalues() {
        let eos = air();
        let v = Vec5::new(1.0, 0.5, -1.0, 0.0, 1.0);
        let lam = max_eigenvalues(&v, &eos);
        let c = 1.4f64.sqrt();
        assert!((lam.x - (0.5 + c)).abs() < 1e-12);
        assert!((lam.y - (1.0 + c)).abs() < 1e-12);
        assert!((lam.z - c).abs() < 1e-12);
    }
}
