// crates/bw_physics/src/spatial.rs

//! 空间算子
//!
//! 有限体积残量装配及其配套操作：
//! - 初值与外边界条件
//! - 原始 ↔ 守恒转换、裁剪与双曲性检查
//! - 流场极值与 CFL 时间步
//! - 对流通量（同材料数值通量 / 界面 Godunov 通量）与残量
//!
//! 残量定义为 R = -(1/vol) Σ_faces flux·area。

use crate::eos::MaterialSet;
use crate::schemes::{
    max_eigenvalues, numerical_flux, physical_flux, ExactRiemannSolver, MusclReconstructor,
    NumericalFlux, RiemannSolutions,
};
use crate::state::Vec5;
use bw_config::{BoundaryCondKind, IcRegionConfig, SolverConfig, StateConfig, TimeConfig};
use bw_foundation::{Axis, BwError, BwResult, Int3, Side};
use bw_mesh::{Communicator, Field3, GhostProjection, ReduceOp, SubDomain};
use glam::DVec3;
use std::sync::Arc;
use tracing::{info, warn};

/// 流场极值（全局规约后）
#[derive(Debug, Clone, Copy)]
pub struct Extrema {
    pub vmin: [f64; 5],
    pub vmax: [f64; 5],
    pub cmin: f64,
    pub cmax: f64,
    pub mach_max: f64,
    pub char_speed_max: f64,
    pub dx_over_char_speed_min: f64,
}

/// 空间算子
pub struct SpaceOperator {
    materials: Arc<MaterialSet>,
    flux: NumericalFlux,
    recon: MusclReconstructor,
    riemann: ExactRiemannSolver,
    bc_kind: [BoundaryCondKind; 6],
    inlet: StateConfig,
    outlet: StateConfig,
    verbose: u8,
    // 重构面状态（子域局部缓冲）
    vl: Field3<Vec5>,
    vr: Field3<Vec5>,
    vb: Field3<Vec5>,
    vt: Field3<Vec5>,
    vk: Field3<Vec5>,
    vf: Field3<Vec5>,
}

fn state_to_vec5(s: &StateConfig) -> Vec5 {
    Vec5::new(s.density, s.velocity[0], s.velocity[1], s.velocity[2], s.pressure)
}

impl SpaceOperator {
    pub fn new(dom: &SubDomain, cfg: &SolverConfig, materials: Arc<MaterialSet>) -> Self {
        let bc_kind = [
            cfg.mesh.bc_x0,
            cfg.mesh.bc_xmax,
            cfg.mesh.bc_y0,
            cfg.mesh.bc_ymax,
            cfg.mesh.bc_z0,
            cfg.mesh.bc_zmax,
        ];
        let mk = || Field3::new(dom.ghosted, Vec5::ZERO);
        Self {
            materials,
            flux: cfg.scheme.flux.into(),
            recon: MusclReconstructor::new(&cfg.scheme),
            riemann: ExactRiemannSolver::new(&cfg.scheme.exact_riemann),
            bc_kind,
            inlet: cfg.bc.inlet,
            outlet: cfg.bc.outlet,
            verbose: cfg.output.verbose,
            vl: mk(),
            vr: mk(),
            vb: mk(),
            vt: mk(),
            vk: mk(),
            vf: mk(),
        }
    }

    pub fn materials(&self) -> &MaterialSet {
        &self.materials
    }

    pub fn boundary_kind(&self, side: Side) -> BoundaryCondKind {
        let n = Side::ALL.iter().position(|&s| s == side).expect("side is one of six");
        self.bc_kind[n]
    }

    // ============================================================
    // 初值与边界条件
    // ============================================================

    /// 施加初值：先铺入流（远场）状态，再依次覆盖几何区域
    pub fn set_initial_condition(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &mut Field3<Vec5>,
        id: &mut Field3<i32>,
        regions: &[IcRegionConfig],
    ) {
        let inlet_v = state_to_vec5(&self.inlet);
        for p in dom.ghosted.iter() {
            v[p] = inlet_v;
            id[p] = self.inlet.material_id as i32;
        }

        for region in regions {
            match region {
                IcRegionConfig::Plane { center, normal, state } => {
                    let x0 = DVec3::from_array(*center);
                    let dir = DVec3::from_array(*normal).normalize();
                    let sv = state_to_vec5(state);
                    for p in dom.interior.iter() {
                        if (dom.coords[p] - x0).dot(dir) > 0.0 {
                            v[p] = sv;
                            id[p] = state.material_id as i32;
                        }
                    }
                }
                IcRegionConfig::Sphere { center, radius, state } => {
                    let x0 = DVec3::from_array(*center);
                    let sv = state_to_vec5(state);
                    for p in dom.interior.iter() {
                        if (dom.coords[p] - x0).length() - radius < 0.0 {
                            v[p] = sv;
                            id[p] = state.material_id as i32;
                        }
                    }
                }
            }
        }

        dom.exchange(comm, v);
        dom.exchange(comm, id);
        self.apply_boundary_conditions(dom, v);
    }

    /// 填充物理域外（面投影）幽灵单元
    pub fn apply_boundary_conditions(&self, dom: &SubDomain, v: &mut Field3<Vec5>) {
        let inlet_v = state_to_vec5(&self.inlet);
        let outlet_v = state_to_vec5(&self.outlet);
        for g in &dom.ghost_outer {
            if g.proj != GhostProjection::Face {
                continue;
            }
            match self.boundary_kind(g.side) {
                BoundaryCondKind::Inlet => v[g.ijk] = inlet_v,
                BoundaryCondKind::Outlet => v[g.ijk] = outlet_v,
                BoundaryCondKind::Wall | BoundaryCondKind::Symmetry => {
                    let mut mirror = v[g.image];
                    let n = 1 + g.side.axis().index();
                    mirror[n] = -mirror[n];
                    v[g.ijk] = mirror;
                }
            }
        }
    }

    // ============================================================
    // 变量转换
    // ============================================================

    pub fn conservative_to_primitive(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        u: &Field3<Vec5>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
        work_on_ghost: bool,
    ) {
        let bbox = if work_on_ghost { dom.ghosted } else { dom.interior };
        for p in bbox.iter() {
            v[p] = self.materials.get(id[p] as usize).conservative_to_primitive(&u[p]);
        }
        dom.exchange(comm, v);
    }

    pub fn primitive_to_conservative(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
        u: &mut Field3<Vec5>,
        work_on_ghost: bool,
    ) {
        let bbox = if work_on_ghost { dom.ghosted } else { dom.interior };
        for p in bbox.iter() {
            u[p] = self.materials.get(id[p] as usize).primitive_to_conservative(&v[p]);
        }
        dom.exchange(comm, u);
    }

    /// 裁剪密度与压力；`check` 为真时对裁剪后的状态做双曲性检查
    ///
    /// 返回全局裁剪单元数；双曲性破坏为致命错误。
    pub fn clip_density_and_pressure(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &mut Field3<Vec5>,
        id: &Field3<i32>,
        work_on_ghost: bool,
        check: bool,
    ) -> BwResult<i64> {
        let bbox = if work_on_ghost { dom.ghosted } else { dom.interior };
        let mut n_clipped = [0i64];
        for p in bbox.iter() {
            let eos = self.materials.get(id[p] as usize);
            n_clipped[0] += i64::from(eos.clip_density_and_pressure(&mut v[p]));
            if check && eos.check_state(&v[p]) {
                return Err(BwError::fatal(format!(
                    "State variables at {p} violate hyperbolicity. matid = {}. v = {:?}",
                    id[p], v[p].0
                )));
            }
        }
        comm.allreduce_i64(&mut n_clipped, ReduceOp::Sum);
        if n_clipped[0] > 0 {
            warn!(cells = n_clipped[0], "Clipped pressure and/or density");
        }
        dom.exchange(comm, v);
        Ok(n_clipped[0])
    }

    // ============================================================
    // 极值与时间步
    // ============================================================

    pub fn find_extreme_values(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
    ) -> Extrema {
        let mut vmin = [f64::MAX; 5];
        let mut vmax = [f64::MIN; 5];
        let mut cmin = [f64::MAX];
        let mut maxes = [f64::MIN; 3]; // cmax, mach_max, char_speed_max
        let mut dx_over = [f64::MAX];

        for p in dom.interior.iter() {
            let state = v[p];
            for n in 0..5 {
                vmin[n] = vmin[n].min(state[n]);
                vmax[n] = vmax[n].max(state[n]);
            }
            let eos = self.materials.get(id[p] as usize);
            let c = eos.sound_speed(state.rho(), state.pressure());
            cmin[0] = cmin[0].min(c);
            maxes[0] = maxes[0].max(c);
            if c > 0.0 {
                maxes[1] = maxes[1].max(state.velocity().length() / c);
            }
            let lam = max_eigenvalues(&state, eos);
            maxes[2] = maxes[2].max(lam.x.max(lam.y).max(lam.z));
            let d = dom.dxyz[p];
            dx_over[0] = dx_over[0].min((d.x / lam.x).min(d.y / lam.y).min(d.z / lam.z));
        }

        comm.allreduce_f64(&mut vmin, ReduceOp::Min);
        comm.allreduce_f64(&mut vmax, ReduceOp::Max);
        comm.allreduce_f64(&mut cmin, ReduceOp::Min);
        comm.allreduce_f64(&mut maxes, ReduceOp::Max);
        comm.allreduce_f64(&mut dx_over, ReduceOp::Min);

        Extrema {
            vmin,
            vmax,
            cmin: cmin[0],
            cmax: maxes[0],
            mach_max: maxes[1],
            char_speed_max: maxes[2],
            dx_over_char_speed_min: dx_over[0],
        }
    }

    /// 时间步长与实际 CFL
    pub fn compute_time_step(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
        time: &TimeConfig,
    ) -> (f64, f64) {
        let ex = self.find_extreme_values(dom, comm, v, id);
        if self.verbose >= 1 {
            info!(
                rho_max = ex.vmax[0],
                p_max = ex.vmax[4],
                c_max = ex.cmax,
                mach_max = ex.mach_max,
                char_speed_max = ex.char_speed_max,
                "flow extrema"
            );
        }
        match time.dt {
            Some(dt) => (dt, dt / ex.dx_over_char_speed_min),
            None => (time.cfl * ex.dx_over_char_speed_min, time.cfl),
        }
    }

    // ============================================================
    // 通量与残量
    // ============================================================

    /// 对流通量装配（面积加权，累加进 `f`）
    ///
    /// 材料界面面解精确黎曼问题；`rs` 非空时缓存半黎曼解供相变
    /// 修复使用。
    pub fn compute_advection_fluxes(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
        f: &mut Field3<Vec5>,
        mut rs: Option<&mut RiemannSolutions>,
    ) -> BwResult<()> {
        // 重构
        let Self { recon, vl, vr, vb, vt, vk, vf, .. } = self;
        recon.reconstruct(dom, v, vl, vr, vb, vt, vk, vf);

        // 裁剪重构状态并检查双曲性（跳过棱角幽灵）
        let gb = dom.ghosted;
        let mut n_clipped = [0i64];
        for p in gb.iter() {
            let corner = usize::from(p.i == gb.lo.i || p.i == gb.hi.i - 1)
                + usize::from(p.j == gb.lo.j || p.j == gb.hi.j - 1)
                + usize::from(p.k == gb.lo.k || p.k == gb.hi.k - 1);
            if corner >= 2 {
                continue;
            }
            let eos = self.materials.get(id[p] as usize);
            for face in [
                &mut self.vl[p],
                &mut self.vr[p],
                &mut self.vb[p],
                &mut self.vt[p],
                &mut self.vk[p],
                &mut self.vf[p],
            ] {
                n_clipped[0] += i64::from(eos.clip_density_and_pressure(face));
                if eos.check_state(face) {
                    return Err(BwError::fatal(format!(
                        "Reconstructed state at {p} violates hyperbolicity. matid = {}. \
                         v = {:?}, face state = {:?}",
                        id[p], v[p].0, face.0
                    )));
                }
            }
        }
        comm.allreduce_i64(&mut n_clipped, ReduceOp::Sum);
        if n_clipped[0] > 0 {
            warn!(states = n_clipped[0], "Clipped pressure and/or density in reconstructed states");
        }

        if let Some(rs) = rs.as_deref_mut() {
            rs.clear();
        }

        f.fill(Vec5::ZERO);
        let ib = dom.interior;

        // 遍历内部以及 +x/+y/+z 幽灵层；每个单元装配其 -x/-y/-z 面
        for k in ib.lo.k..gb.hi.k {
            for j in ib.lo.j..gb.hi.j {
                for i in ib.lo.i..gb.hi.i {
                    let p = Int3::new(i, j, k);
                    let my_id = id[p] as usize;
                    let d = dom.dxyz[p];

                    // F_{i-1/2,j,k}
                    if k != gb.hi.k - 1 && j != gb.hi.j - 1 {
                        let pm = p.offset(Axis::X, -1);
                        let area = d.y * d.z;
                        let local = self.face_flux(
                            Axis::X,
                            pm,
                            p,
                            &self.vr[pm],
                            &self.vl[p],
                            id[pm] as usize,
                            my_id,
                            rs.as_deref_mut(),
                        ) * area;
                        f[pm] += local;
                        f[p] = f[p] - local; // 守恒累加
                    }

                    // G_{i,j-1/2,k}
                    if k != gb.hi.k - 1 && i != gb.hi.i - 1 {
                        let pm = p.offset(Axis::Y, -1);
                        let area = d.x * d.z;
                        let local = self.face_flux(
                            Axis::Y,
                            pm,
                            p,
                            &self.vt[pm],
                            &self.vb[p],
                            id[pm] as usize,
                            my_id,
                            rs.as_deref_mut(),
                        ) * area;
                        f[pm] += local;
                        f[p] = f[p] - local;
                    }

                    // H_{i,j,k-1/2}
                    if j != gb.hi.j - 1 && i != gb.hi.i - 1 {
                        let pm = p.offset(Axis::Z, -1);
                        let area = d.x * d.y;
                        let local = self.face_flux(
                            Axis::Z,
                            pm,
                            p,
                            &self.vf[pm],
                            &self.vk[p],
                            id[pm] as usize,
                            my_id,
                            rs.as_deref_mut(),
                        ) * area;
                        f[pm] += local;
                        f[p] = f[p] - local;
                    }
                }
            }
        }
        Ok(())
    }

    /// 单个面的通量；材料界面走精确黎曼 + Godunov
    #[allow(clippy::too_many_arguments)]
    fn face_flux(
        &self,
        axis: Axis,
        pm: Int3,
        pp: Int3,
        vm: &Vec5,
        vp: &Vec5,
        id_m: usize,
        id_p: usize,
        rs: Option<&mut RiemannSolutions>,
    ) -> Vec5 {
        if id_m == id_p {
            return numerical_flux(self.flux, axis, vm, vp, self.materials.get(id_p));
        }

        let (mid, mid_id) = self.riemann.solve(axis, vm, id_m, vp, id_p, &self.materials);
        if let Some(rs) = rs {
            // pp 的负侧面 / pm 的正侧面
            match axis {
                Axis::X => {
                    rs.left.insert(pp, (mid, mid_id));
                    rs.right.insert(pm, (mid, mid_id));
                }
                Axis::Y => {
                    rs.bottom.insert(pp, (mid, mid_id));
                    rs.top.insert(pm, (mid, mid_id));
                }
                Axis::Z => {
                    rs.back.insert(pp, (mid, mid_id));
                    rs.front.insert(pm, (mid, mid_id));
                }
            }
        }
        physical_flux(axis, &mid, self.materials.get(mid_id))
    }

    /// 残量 R = -(1/vol)·Σ flux·area
    pub fn compute_residual(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
        r: &mut Field3<Vec5>,
        rs: Option<&mut RiemannSolutions>,
    ) -> BwResult<()> {
        self.compute_advection_fluxes(dom, comm, v, id, r, rs)?;
        for p in dom.interior.iter() {
            r[p] = r[p] * (-1.0 / dom.volume[p]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_config::{EosConfig, MaterialConfig, SolverConfig};
    use bw_mesh::{GlobalMesh, SoloComm};

    fn config() -> SolverConfig {
        let mut cfg = SolverConfig::default();
        cfg.materials.push(MaterialConfig {
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
        });
        cfg.bc.inlet = StateConfig {
            density: 1.0,
            velocity: [0.0; 3],
            pressure: 1.0,
            material_id: 0,
        };
        cfg
    }

    fn setup(n: usize) -> (SubDomain, SpaceOperator) {
        let cfg = config();
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, n, n, n).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let mats = Arc::new(MaterialSet::from_config(&cfg.materials));
        let spo = SpaceOperator::new(&dom, &cfg, mats);
        (dom, spo)
    }

    #[test]
    fn test_uniform_state_zero_residual() {
        let (dom, mut spo) = setup(4);
        let comm = SoloComm;
        let mut v = Field3::new(dom.ghosted, Vec5::ZERO);
        let mut id = Field3::new(dom.ghosted, 0i32);
        spo.set_initial_condition(&dom, &comm, &mut v, &mut id, &[]);
        let mut r = Field3::new(dom.ghosted, Vec5::ZERO);
        spo.compute_residual(&dom, &comm, &v, &id, &mut r, None).unwrap();
        for p in dom.interior.iter() {
            for n in 0..5 {
                assert!(r[p][n].abs() < 1e-12, "residual {n} at {p}: {}", r[p][n]);
            }
        }
    }

    #[test]
    fn test_wall_bc_mirrors_normal_velocity() {
        let mut cfg = config();
        cfg.mesh.bc_x0 = BoundaryCondKind::Wall;
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 4, 4, 4).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let mats = Arc::new(MaterialSet::from_config(&cfg.materials));
        let spo = SpaceOperator::new(&dom, &cfg, mats);

        let mut v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.7, 0.2, -0.1, 2.0));
        spo.apply_boundary_conditions(&dom, &mut v);
        let g = Int3::new(-1, 1, 1);
        assert_eq!(v[g][1], -0.7);
        assert_eq!(v[g][2], 0.2);
        assert_eq!(v[g][0], 1.0);
        assert_eq!(v[g][4], 2.0);
    }

    #[test]
    fn test_inlet_bc_overrides_neighbor() {
        let mut cfg = config();
        cfg.mesh.bc_x0 = BoundaryCondKind::Inlet;
        cfg.bc.inlet.density = 3.0;
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 4, 4, 4).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let mats = Arc::new(MaterialSet::from_config(&cfg.materials));
        let spo = SpaceOperator::new(&dom, &cfg, mats);

        let mut v = Field3::new(dom.ghosted, Vec5::new(9.0, 9.0, 9.0, 9.0, 9.0));
        spo.apply_boundary_conditions(&dom, &mut v);
        assert_eq!(v[Int3::new(-1, 0, 0)][0], 3.0);
    }

    #[test]
    fn test_time_step_uses_cfl() {
        let (dom, spo) = setup(4);
        let comm = SoloComm;
        let mut v = Field3::new(dom.ghosted, Vec5::ZERO);
        let mut id = Field3::new(dom.ghosted, 0i32);
        spo.set_initial_condition(&dom, &comm, &mut v, &mut id, &[]);
        let time = TimeConfig { cfl: 0.5, ..Default::default() };
        let (dt, cfl) = spo.compute_time_step(&dom, &comm, &v, &id, &time);
        // 静止声速 c = sqrt(1.4)，dx = 0.25
        let expected = 0.5 * 0.25 / 1.4f64.sqrt();
        assert!((dt - expected).abs() < 1e-12);
        assert!((cfl - 0.5).abs() < 1e-14);
    }

    #[test]
    fn test_clip_counts_and_reports() {
        let (dom, spo) = setup(4);
        let comm = SoloComm;
        let mut v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.0, 0.0, 0.0, 1.0));
        let id = Field3::new(dom.ghosted, 0i32);
        v[Int3::new(1, 1, 1)] = Vec5::new(-2.0, 0.0, 0.0, 0.0, 1.0);
        let n = spo
            .clip_density_and_pressure(&dom, &comm, &mut v, &id, false, true)
            .unwrap();
        assert_eq!(n, 1);
        assert!(v[Int3::new(1, 1, 1)][0] > 0.0);
    }

    #[test]
    fn test_conservation_sod_step() {
        // 一次残量评估的总质量变化只来自边界通量
        let (dom, mut spo) = setup(8);
        let comm = SoloComm;
        let mut v = Field3::new(dom.ghosted, Vec5::ZERO);
        let mut id = Field3::new(dom.ghosted, 0i32);
        let regions = vec![IcRegionConfig::Plane {
            center: [0.5, 0.0, 0.0],
            normal: [1.0, 0.0, 0.0],
            state: StateConfig {
                density: 0.125,
                velocity: [0.0; 3],
                pressure: 0.1,
                material_id: 0,
            },
        }];
        spo.set_initial_condition(&dom, &comm, &mut v, &mut id, &regions);
        let mut r = Field3::new(dom.ghosted, Vec5::ZERO);
        spo.compute_residual(&dom, &comm, &v, &id, &mut r, None).unwrap();
        // 内部面两侧正负相消：Σ R·vol 等于边界通量和；这里左右边界
        // 状态对称恒定（出流复制不是镜像），至少应有限且 y/z 分量为零
        let mut total = Vec5::ZERO;
        for p in dom.interior.iter() {
            total += r[p] * dom.volume[p];
        }
        assert!(total[2].abs() < 1e-12);
        assert!(total[3].abs() < 1e-12);
        assert!(total.is_finite());
    }
}
