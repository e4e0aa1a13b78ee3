// crates/bw_physics/src/levelset/reinit.rs

//! 水平集重初始化
//!
//! 在伪时间里求解 Hamilton–Jacobi 方程 ∂φ/∂τ + sgn(φ₀)(|∇φ|-1) = 0，
//! 直到 |∇φ| ≈ 1，同时不移动零水平集。支持全网格与窄带两种模式。
//!
//! 第一层（Gamma）结点的处理方式见 [`FirstLayerTreatment`]：
//! RSU 单步重标定、CR-1/CR-2 平均约束，或每个 RK 子步施加
//! HCR 修正（β = 0.5）。
//!
//! 窄带簿记：`level` 为带层号（界面 0，相邻 1，至带宽 B），
//! `useful` 为带内掩码，`active` 为严格带内掩码；带外的 φ 写成
//! 哨兵值（带内极值的十倍），模板越带按零导数处理。

use crate::levelset::NarrowBand;
use bw_config::{FirstLayerTreatment, LevelSetBc, ReinitConfig};
use bw_foundation::{Box3, Int3, Side};
use bw_mesh::{Communicator, Field3, GhostProjection, ReduceOp, SubDomain};
use std::collections::HashSet;
use tracing::{debug, warn};

/// 第一层结点及其邻侧系数
///
/// `s[α]` 标记第 α 个轴向邻居在界面另一侧；`r[α] = φ_self/φ_nb`；
/// `r0 = φ_self / Σ φ_nb`（对 s 为真的邻居求和）。
#[derive(Debug, Clone)]
pub struct FirstLayerNode {
    pub ijk: Int3,
    pub s: [bool; 6],
    pub r: [f64; 6],
    pub ns: usize,
    pub r0: f64,
    pub f: f64,
}

impl FirstLayerNode {
    fn new(ijk: Int3) -> Self {
        Self {
            ijk,
            s: [false; 6],
            r: [0.0; 6],
            ns: 0,
            r0: 0.0,
            f: 0.0,
        }
    }
}

/// 水平集重初始化器
pub struct LevelSetReinitializer {
    cfg: ReinitConfig,
    bc: LevelSetBc,
    bandwidth: usize,
    tag: Field3<i32>,
    sign: Field3<f64>,
    phi1: Field3<f64>,
    res: Field3<f64>,
    /// 两层幽灵的 φ₀ 拷贝（第一层差分要用到 ±2 邻居）
    phi_g2: Field3<f64>,
    phi_max: f64,
    phi_min: f64,
    phi_out_pos: f64,
    phi_out_neg: f64,
}

impl LevelSetReinitializer {
    pub fn new(dom: &SubDomain, cfg: ReinitConfig, bc: LevelSetBc, bandwidth: usize) -> Self {
        Self {
            cfg,
            bc,
            bandwidth,
            tag: Field3::new(dom.ghosted, 0),
            sign: Field3::new(dom.ghosted, 0.0),
            phi1: Field3::new(dom.ghosted, 0.0),
            res: Field3::new(dom.ghosted, 0.0),
            phi_g2: Field3::new(dom.interior.grown(2), 0.0),
            phi_max: f64::MIN,
            phi_min: f64::MAX,
            phi_out_pos: 0.0,
            phi_out_neg: 0.0,
        }
    }

    pub fn band_sentinels(&self) -> (f64, f64) {
        (self.phi_out_pos, self.phi_out_neg)
    }

    // ============================================================
    // 全网格模式
    // ============================================================

    /// 全网格重初始化
    pub fn reinitialize(&mut self, dom: &SubDomain, comm: &dyn Communicator, phi: &mut Field3<f64>) {
        let mut first_layer = self.tag_first_layer_nodes(dom, comm, phi);
        self.evaluate_sign_function(dom, comm, phi);

        if matches!(
            self.cfg.first_layer,
            FirstLayerTreatment::Unconstrained
                | FirstLayerTreatment::Constrained1
                | FirstLayerTreatment::Constrained2
        ) {
            self.phi1.copy_from(phi);
            self.reinitialize_first_layer_nodes(dom, comm, phi, &first_layer);
            self.apply_boundary_conditions(dom, comm, phi, None);
        }

        self.runge_kutta_loop(dom, comm, phi, &mut first_layer, None);
    }

    /// 带内重初始化（窄带簿记随之更新）
    pub fn reinitialize_in_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        band: &mut NarrowBand,
    ) {
        self.update_phi_max_min_in_band(comm, phi, band);

        let (mut first_layer, first_layer_inc_ghost) =
            self.tag_first_layer_nodes_in_band(dom, comm, phi, band);
        self.update_narrow_band(dom, comm, phi, &first_layer_inc_ghost, band);
        self.evaluate_sign_function_in_band(dom, comm, phi, band);

        if matches!(
            self.cfg.first_layer,
            FirstLayerTreatment::Unconstrained
                | FirstLayerTreatment::Constrained1
                | FirstLayerTreatment::Constrained2
        ) {
            self.phi1.copy_from(phi);
            self.reinitialize_first_layer_nodes(dom, comm, phi, &first_layer);
            self.apply_boundary_conditions(dom, comm, phi, Some(&*band));
        }

        // RK 循环只读窄带（残量模板与边界掩码）
        self.runge_kutta_loop(dom, comm, phi, &mut first_layer, Some(&*band));
    }

    /// 三阶 SSP Runge–Kutta 主循环
    fn runge_kutta_loop(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        first_layer: &mut [FirstLayerNode],
        band: Option<&NarrowBand>,
    ) {
        let max_its = self.cfg.max_its;
        let tol = self.cfg.convergence_tolerance;
        let mut residual = 0.0;
        let mut iter = 0;

        while iter < max_its {
            // ************** RK3 第 1 步 *****************
            residual = self.compute_residual(dom, comm, phi, band);
            debug!(iter, residual, tol, "reinitialization residual");
            if residual < tol {
                return;
            }

            self.phi1.copy_from(phi);
            for p in dom.interior.iter() {
                self.phi1[p] += self.res[p];
            }
            dom.exchange(comm, &mut self.phi1);
            self.stage_phi1_bc_and_correction(dom, comm, band, first_layer);

            // ************** RK3 第 2 步 *****************
            self.compute_residual_into_phi1_buffer(dom, comm, band);
            for p in dom.interior.iter() {
                self.phi1[p] = 0.25 * self.phi1[p] + 0.75 * phi[p] + 0.25 * self.res[p];
            }
            dom.exchange(comm, &mut self.phi1);
            self.stage_phi1_bc_and_correction(dom, comm, band, first_layer);

            // ************** RK3 第 3 步 *****************
            self.compute_residual_into_phi1_buffer(dom, comm, band);
            for p in dom.interior.iter() {
                phi[p] = (1.0 / 3.0) * phi[p] + (2.0 / 3.0) * self.phi1[p] + (2.0 / 3.0) * self.res[p];
            }
            dom.exchange(comm, phi);
            self.apply_boundary_conditions(dom, comm, phi, band);
            self.apply_correction_to_first_layer_nodes(dom, comm, phi, first_layer);

            iter += 1;
        }

        if iter == max_its {
            warn!(residual, tol, "reinitialization failed to converge");
        }
    }

    /// phi1 的阶段收尾：边界条件 + 第一层修正
    fn stage_phi1_bc_and_correction(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        band: Option<&NarrowBand>,
        first_layer: &mut [FirstLayerNode],
    ) {
        let mut phi1 = std::mem::replace(&mut self.phi1, Field3::new(Box3::new(Int3::default(), Int3::default()), 0.0));
        self.apply_boundary_conditions(dom, comm, &mut phi1, band);
        self.apply_correction_to_first_layer_nodes(dom, comm, &mut phi1, first_layer);
        self.phi1 = phi1;
    }

    /// 对 phi1 计算残量（写入 res）
    fn compute_residual_into_phi1_buffer(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        band: Option<&NarrowBand>,
    ) {
        let phi1 = std::mem::replace(&mut self.phi1, Field3::new(Box3::new(Int3::default(), Int3::default()), 0.0));
        self.compute_residual(dom, comm, &phi1, band);
        self.phi1 = phi1;
    }

    // ============================================================
    // 第一层标记
    // ============================================================

    /// 标记第一层结点并计算邻侧系数（全网格）
    fn tag_first_layer_nodes(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &Field3<f64>,
    ) -> Vec<FirstLayerNode> {
        let mut first_layer = Vec::new();
        let gb = dom.ghosted;

        for p in gb.iter() {
            self.tag[p] = 0;
            if dom.outside_physical_domain_and_unpopulated(p) {
                continue;
            }
            if self.has_sign_change(phi, p, gb) {
                self.tag[p] = 1;
                if dom.is_here(p, false) {
                    first_layer.push(FirstLayerNode::new(p));
                }
            }
        }

        self.compute_first_layer_coefficients(phi, &mut first_layer);
        dom.exchange(comm, &mut self.tag);
        first_layer
    }

    /// 标记第一层结点（带内），同时给出含幽灵的第一层列表
    fn tag_first_layer_nodes_in_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &Field3<f64>,
        band: &NarrowBand,
    ) -> (Vec<FirstLayerNode>, Vec<Int3>) {
        let mut first_layer = Vec::new();
        let mut inc_ghost = Vec::new();
        let gb = dom.ghosted;

        for &p in &band.useful_nodes {
            self.tag[p] = 0;
            if dom.outside_physical_domain_and_unpopulated(p) {
                continue;
            }
            if self.has_sign_change(phi, p, gb) {
                self.tag[p] = 1;
                inc_ghost.push(p);
                if dom.is_here(p, false) {
                    first_layer.push(FirstLayerNode::new(p));
                }
            }
        }

        dom.exchange(comm, &mut self.tag);

        // 交换后吸收邻接子域/域外幽灵新出现的第一层结点
        let mut seen: HashSet<Int3> = inc_ghost.iter().copied().collect();
        for &p in &dom.ghost_inner {
            if self.tag[p] == 1 && seen.insert(p) {
                inc_ghost.push(p);
            }
        }
        for g in &dom.ghost_outer {
            if self.tag[g.ijk] == 1 && seen.insert(g.ijk) {
                inc_ghost.push(g.ijk);
            }
        }

        self.compute_first_layer_coefficients(phi, &mut first_layer);
        (first_layer, inc_ghost)
    }

    /// 六个轴向邻居是否存在符号翻转（含零）
    fn has_sign_change(&self, phi: &Field3<f64>, p: Int3, gb: Box3) -> bool {
        let v = phi[p];
        for (n, q) in p.axis_neighbors().iter().enumerate() {
            let in_bounds = match n {
                0 => q.i >= gb.lo.i,
                1 => q.i < gb.hi.i,
                2 => q.j >= gb.lo.j,
                3 => q.j < gb.hi.j,
                4 => q.k >= gb.lo.k,
                _ => q.k < gb.hi.k,
            };
            if in_bounds && v * phi[*q] <= 0.0 {
                return true;
            }
        }
        false
    }

    /// 计算每个第一层结点的 s、r、r0
    fn compute_first_layer_coefficients(&self, phi: &Field3<f64>, nodes: &mut [FirstLayerNode]) {
        for node in nodes.iter_mut() {
            let p = node.ijk;
            let v = phi[p];
            let mut sum = 0.0;
            for (n, q) in p.axis_neighbors().iter().enumerate() {
                let w = phi[*q];
                if v * w < 0.0 {
                    node.s[n] = true;
                    node.r[n] = v / w;
                    node.ns += 1;
                    sum += w;
                }
            }
            node.r0 = if sum != 0.0 { v / sum } else { 0.0 };
        }
    }

    // ============================================================
    // 符号函数
    // ============================================================

    fn evaluate_sign_function(&mut self, dom: &SubDomain, comm: &dyn Communicator, phi: &Field3<f64>) {
        for p in dom.ghosted.iter() {
            let factor = dom.min_spacing(p);
            self.sign[p] = phi[p] / (phi[p] * phi[p] + factor * factor).sqrt();
        }
        dom.exchange(comm, &mut self.sign);
    }

    fn evaluate_sign_function_in_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &Field3<f64>,
        band: &NarrowBand,
    ) {
        for &p in &band.useful_nodes {
            let factor = dom.min_spacing(p);
            self.sign[p] = phi[p] / (phi[p] * phi[p] + factor * factor).sqrt();
        }
        dom.exchange(comm, &mut self.sign);
    }

    // ============================================================
    // 第一层重初始化（RSU / CR-1 / CR-2）
    // ============================================================

    fn reinitialize_first_layer_nodes(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        first_layer: &[FirstLayerNode],
    ) {
        self.populate_phi_g2(dom);
        let (nx, ny, nz) = dom.global_size();

        for node in first_layer {
            let p = node.ijk;
            let d = dom.dxyz[p];
            let mut grad = [0.0f64; 3];

            // x
            {
                let eps = 1.0e-3 * d.x;
                let im = Int3::new(p.i - 1, p.j, p.k);
                let ip = Int3::new(p.i + 1, p.j, p.k);
                let phi00 = if p.i - 2 > -1 {
                    self.phi_g2[Int3::new(p.i - 2, p.j, p.k)]
                } else {
                    self.phi_g2[im]
                };
                let phi3 = if p.i + 2 <= nx {
                    self.phi_g2[Int3::new(p.i + 2, p.j, p.k)]
                } else {
                    self.phi_g2[ip]
                };
                grad[0] = differentiate_in_first_layer(
                    dom.coords[im].x,
                    dom.coords[p].x,
                    dom.coords[ip].x,
                    self.tag[im],
                    self.tag[ip],
                    self.phi_g2[im],
                    self.phi_g2[p],
                    self.phi_g2[ip],
                    phi00,
                    phi3,
                    eps,
                );
            }
            // y
            {
                let eps = 1.0e-3 * d.y;
                let jm = Int3::new(p.i, p.j - 1, p.k);
                let jp = Int3::new(p.i, p.j + 1, p.k);
                let phi00 = if p.j - 2 > -1 {
                    self.phi_g2[Int3::new(p.i, p.j - 2, p.k)]
                } else {
                    self.phi_g2[jm]
                };
                let phi3 = if p.j + 2 <= ny {
                    self.phi_g2[Int3::new(p.i, p.j + 2, p.k)]
                } else {
                    self.phi_g2[jp]
                };
                grad[1] = differentiate_in_first_layer(
                    dom.coords[jm].y,
                    dom.coords[p].y,
                    dom.coords[jp].y,
                    self.tag[jm],
                    self.tag[jp],
                    self.phi_g2[jm],
                    self.phi_g2[p],
                    self.phi_g2[jp],
                    phi00,
                    phi3,
                    eps,
                );
            }
            // z
            {
                let eps = 1.0e-3 * d.z;
                let km = Int3::new(p.i, p.j, p.k - 1);
                let kp = Int3::new(p.i, p.j, p.k + 1);
                let phi00 = if p.k - 2 > -1 {
                    self.phi_g2[Int3::new(p.i, p.j, p.k - 2)]
                } else {
                    self.phi_g2[km]
                };
                let phi3 = if p.k + 2 <= nz {
                    self.phi_g2[Int3::new(p.i, p.j, p.k + 2)]
                } else {
                    self.phi_g2[kp]
                };
                grad[2] = differentiate_in_first_layer(
                    dom.coords[km].z,
                    dom.coords[p].z,
                    dom.coords[kp].z,
                    self.tag[km],
                    self.tag[kp],
                    self.phi_g2[km],
                    self.phi_g2[p],
                    self.phi_g2[kp],
                    phi00,
                    phi3,
                    eps,
                );
            }

            let norm = (grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2]).sqrt();
            if norm == 0.0 {
                warn!(node = %p, "updating first layer node led to zero gradient");
                phi[p] = self.phi_g2[p];
            } else {
                phi[p] = self.phi_g2[p] / norm;
            }
        }

        // CR-1 / CR-2 平均约束
        match self.cfg.first_layer {
            FirstLayerTreatment::Constrained1 => {
                let mut values = Vec::with_capacity(first_layer.len());
                for node in first_layer {
                    let p = node.ijk;
                    let mut sum = 0.0;
                    for (n, q) in p.axis_neighbors().iter().enumerate() {
                        if node.s[n] {
                            sum += phi[*q] / self.phi_g2[*q];
                        }
                    }
                    let f = if node.ns != 0 {
                        self.phi_g2[p] * sum / node.ns as f64
                    } else {
                        0.0
                    };
                    values.push(f);
                }
                for (node, f) in first_layer.iter().zip(values) {
                    phi[node.ijk] = f;
                }
            }
            FirstLayerTreatment::Constrained2 => {
                let mut values = Vec::with_capacity(first_layer.len());
                for node in first_layer {
                    let p = node.ijk;
                    let mut sum1 = 0.0;
                    let mut sum2 = 0.0;
                    for (n, q) in p.axis_neighbors().iter().enumerate() {
                        if node.s[n] {
                            sum1 += phi[*q];
                            sum2 += self.phi_g2[*q];
                        }
                    }
                    // sum2 = 0 只会在所有 s 为假（φ₀ = 0）时发生
                    let f = if sum2 != 0.0 { self.phi_g2[p] * sum1 / sum2 } else { 0.0 };
                    values.push(f);
                }
                for (node, f) in first_layer.iter().zip(values) {
                    phi[node.ijk] = f;
                }
            }
            _ => {}
        }

        dom.exchange(comm, phi);
    }

    /// 把 φ₀ 拷入两层幽灵缓冲；本子域盒之外按最近值延拓
    fn populate_phi_g2(&mut self, dom: &SubDomain) {
        let gb = dom.ghosted;
        let g2 = self.phi_g2.bbox();
        for p in g2.iter() {
            let q = Int3::new(
                p.i.clamp(gb.lo.i, gb.hi.i - 1),
                p.j.clamp(gb.lo.j, gb.hi.j - 1),
                p.k.clamp(gb.lo.k, gb.hi.k - 1),
            );
            self.phi_g2[p] = self.phi1[q];
        }
    }

    // ============================================================
    // 残量（Godunov Hamiltonian）
    // ============================================================

    /// 计算残量并返回全局最大 |残量|
    ///
    /// `res[p] = -dt·sign·(√(max(a∓²,b±²)+…) - 1)`，dt = cfl·min(dxyz)
    /// 逐点取值。带模式下只扫带内结点，越带导数取零。
    fn compute_residual(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &Field3<f64>,
        band: Option<&NarrowBand>,
    ) -> f64 {
        let fix_first_layer = matches!(
            self.cfg.first_layer,
            FirstLayerTreatment::Fixed
                | FirstLayerTreatment::Unconstrained
                | FirstLayerTreatment::Constrained1
                | FirstLayerTreatment::Constrained2
        );

        let mut max_residual = [0.0f64];

        match band {
            None => {
                for p in dom.interior.iter() {
                    let local = self.residual_at(dom, phi, p, None, fix_first_layer);
                    max_residual[0] = max_residual[0].max(local);
                }
            }
            Some(b) => {
                for &p in &b.useful_nodes {
                    if !dom.is_here(p, false) {
                        continue;
                    }
                    let local = self.residual_at(dom, phi, p, Some(b), fix_first_layer);
                    max_residual[0] = max_residual[0].max(local);
                }
            }
        }

        comm.allreduce_f64(&mut max_residual, ReduceOp::Max);
        dom.exchange(comm, &mut self.res);
        max_residual[0]
    }

    /// 单点 Godunov 残量；返回 |局部残量|（第一层冻结结点返回 0）
    fn residual_at(
        &mut self,
        dom: &SubDomain,
        phi: &Field3<f64>,
        p: Int3,
        band: Option<&NarrowBand>,
        fix_first_layer: bool,
    ) -> f64 {
        if fix_first_layer && self.tag[p] != 0 {
            self.res[p] = 0.0;
            return 0.0;
        }

        let dt = self.cfg.cfl * dom.min_spacing(p);
        let c = dom.coords[p];
        let nb = p.axis_neighbors();
        let usable = |q: Int3| band.map_or(true, |b| b.useful[q] != 0);

        let a = if usable(nb[0]) {
            (phi[p] - phi[nb[0]]) / (c.x - dom.coords[nb[0]].x)
        } else {
            0.0
        };
        let b = if usable(nb[1]) {
            (phi[nb[1]] - phi[p]) / (dom.coords[nb[1]].x - c.x)
        } else {
            0.0
        };
        let cc = if usable(nb[2]) {
            (phi[p] - phi[nb[2]]) / (c.y - dom.coords[nb[2]].y)
        } else {
            0.0
        };
        let d = if usable(nb[3]) {
            (phi[nb[3]] - phi[p]) / (dom.coords[nb[3]].y - c.y)
        } else {
            0.0
        };
        let e = if usable(nb[4]) {
            (phi[p] - phi[nb[4]]) / (c.z - dom.coords[nb[4]].z)
        } else {
            0.0
        };
        let f = if usable(nb[5]) {
            (phi[nb[5]] - phi[p]) / (dom.coords[nb[5]].z - c.z)
        } else {
            0.0
        };

        let (ap, am) = (a.max(0.0), a.min(0.0));
        let (bp, bm) = (b.max(0.0), b.min(0.0));
        let (cp, cm) = (cc.max(0.0), cc.min(0.0));
        let (dp, dm) = (d.max(0.0), d.min(0.0));
        let (ep, em) = (e.max(0.0), e.min(0.0));
        let (fp, fm) = (f.max(0.0), f.min(0.0));

        let local = if phi[p] >= 0.0 {
            ((ap * ap).max(bm * bm) + (cp * cp).max(dm * dm) + (ep * ep).max(fm * fm)).sqrt() - 1.0
        } else {
            ((am * am).max(bp * bp) + (cm * cm).max(dp * dp) + (em * em).max(fp * fp)).sqrt() - 1.0
        };

        self.res[p] = -dt * self.sign[p] * local;
        local.abs()
    }

    // ============================================================
    // 外边界条件
    // ============================================================

    /// 填充物理域外（面投影）幽灵并交换
    pub fn apply_boundary_conditions(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        band: Option<&NarrowBand>,
    ) {
        let (nx, ny, nz) = dom.global_size();

        for g in &dom.ghost_outer {
            if g.proj != GhostProjection::Face {
                continue;
            }
            let p = g.ijk;
            if let Some(b) = band {
                if b.useful[p] == 0 {
                    continue;
                }
            }

            match self.bc {
                LevelSetBc::ZeroNeumann => {
                    phi[p] = phi[g.image];
                }
                LevelSetBc::LinearExtrapolation => {
                    // 子域宽度不足以外推时退化为零梯度
                    let extrapolated = match g.side {
                        Side::XMin if p.i + 2 < nx => {
                            let (r, r1, r2) = (
                                dom.coords[p].x,
                                dom.coords[Int3::new(p.i + 1, p.j, p.k)].x,
                                dom.coords[Int3::new(p.i + 2, p.j, p.k)].x,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i + 1, p.j, p.k)],
                                phi[Int3::new(p.i + 2, p.j, p.k)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        Side::XMax if p.i - 2 >= 0 => {
                            let (r, r1, r2) = (
                                dom.coords[p].x,
                                dom.coords[Int3::new(p.i - 1, p.j, p.k)].x,
                                dom.coords[Int3::new(p.i - 2, p.j, p.k)].x,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i - 1, p.j, p.k)],
                                phi[Int3::new(p.i - 2, p.j, p.k)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        Side::YMin if p.j + 2 < ny => {
                            let (r, r1, r2) = (
                                dom.coords[p].y,
                                dom.coords[Int3::new(p.i, p.j + 1, p.k)].y,
                                dom.coords[Int3::new(p.i, p.j + 2, p.k)].y,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i, p.j + 1, p.k)],
                                phi[Int3::new(p.i, p.j + 2, p.k)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        Side::YMax if p.j - 2 >= 0 => {
                            let (r, r1, r2) = (
                                dom.coords[p].y,
                                dom.coords[Int3::new(p.i, p.j - 1, p.k)].y,
                                dom.coords[Int3::new(p.i, p.j - 2, p.k)].y,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i, p.j - 1, p.k)],
                                phi[Int3::new(p.i, p.j - 2, p.k)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        Side::ZMin if p.k + 2 < nz => {
                            let (r, r1, r2) = (
                                dom.coords[p].z,
                                dom.coords[Int3::new(p.i, p.j, p.k + 1)].z,
                                dom.coords[Int3::new(p.i, p.j, p.k + 2)].z,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i, p.j, p.k + 1)],
                                phi[Int3::new(p.i, p.j, p.k + 2)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        Side::ZMax if p.k - 2 >= 0 => {
                            let (r, r1, r2) = (
                                dom.coords[p].z,
                                dom.coords[Int3::new(p.i, p.j, p.k - 1)].z,
                                dom.coords[Int3::new(p.i, p.j, p.k - 2)].z,
                            );
                            let (f1, f2) = (
                                phi[Int3::new(p.i, p.j, p.k - 1)],
                                phi[Int3::new(p.i, p.j, p.k - 2)],
                            );
                            Some(f1 + (f2 - f1) / (r2 - r1) * (r - r1))
                        }
                        _ => None,
                    };
                    phi[p] = extrapolated.unwrap_or(phi[g.image]);
                }
            }
        }

        dom.exchange(comm, phi);
    }

    // ============================================================
    // 第一层 HCR 修正
    // ============================================================

    /// 迭代约束模式下给第一层加 β·dt·f 强迫项
    fn apply_correction_to_first_layer_nodes(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        first_layer: &mut [FirstLayerNode],
    ) {
        let hcr1 = self.cfg.first_layer == FirstLayerTreatment::IterativeConstrained1;
        let hcr2 = self.cfg.first_layer == FirstLayerTreatment::IterativeConstrained2;
        if !hcr1 && !hcr2 {
            return;
        }

        // 第 1 步：计算修正量 f
        for node in first_layer.iter_mut() {
            let p = node.ijk;
            node.f = 0.0;

            // 只修正完全被对侧包围的结点（C^ν）
            let nb = p.axis_neighbors();
            if nb.iter().any(|q| phi[p] * phi[*q] >= 0.0) {
                continue;
            }

            let mut sum = 0.0;
            for (n, q) in nb.iter().enumerate() {
                if node.s[n] {
                    sum += if hcr1 { node.r[n] * phi[*q] } else { phi[*q] };
                }
            }
            node.f = if hcr1 {
                if node.ns != 0 {
                    sum / node.ns as f64 - phi[p]
                } else {
                    -phi[p]
                }
            } else {
                node.r0 * sum - phi[p]
            };
            node.f /= dom.min_spacing(p);
        }

        // 第 2 步：加强迫项
        let beta = 0.5;
        for node in first_layer.iter() {
            let p = node.ijk;
            let dt = self.cfg.cfl * dom.min_spacing(p);
            phi[p] += dt * beta * node.f;
        }

        dom.exchange(comm, phi);

        // 第 3 步：边界条件
        self.apply_boundary_conditions(dom, comm, phi, None);
    }

    // ============================================================
    // 窄带簿记
    // ============================================================

    fn update_phi_max_min_in_band(
        &mut self,
        comm: &dyn Communicator,
        phi: &Field3<f64>,
        band: &NarrowBand,
    ) {
        for &p in &band.useful_nodes {
            self.phi_max = self.phi_max.max(phi[p]);
            self.phi_min = self.phi_min.min(phi[p]);
        }
        let mut hi = [self.phi_max];
        let mut lo = [self.phi_min];
        comm.allreduce_f64(&mut hi, ReduceOp::Max);
        comm.allreduce_f64(&mut lo, ReduceOp::Min);
        self.phi_max = hi[0];
        self.phi_min = lo[0];
    }

    /// 首次构建窄带：层 0/1 播种 → 逐层扩展 → 带外截断
    pub fn construct_narrow_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        band: &mut NarrowBand,
    ) {
        band.useful_nodes.clear();
        band.active_nodes.clear();
        let gb = dom.ghosted;
        let ib = dom.interior;

        // 第 1 步：层 0（φ=0）与层 1
        for p in gb.iter() {
            band.level[p] = i32::MAX;
            band.useful[p] = 0;
            band.active[p] = 0;

            if dom.outside_physical_domain_and_unpopulated(p) {
                continue;
            }

            let seeded = if phi[p] == 0.0 {
                band.level[p] = 0;
                true
            } else {
                // 负侧邻居用内部下界，正侧用幽灵上界
                let nb = p.axis_neighbors();
                let hit = (nb[0].i >= ib.lo.i && phi[p] * phi[nb[0]] <= 0.0)
                    || (nb[1].i < gb.hi.i && phi[p] * phi[nb[1]] <= 0.0)
                    || (nb[2].j >= ib.lo.j && phi[p] * phi[nb[2]] <= 0.0)
                    || (nb[3].j < gb.hi.j && phi[p] * phi[nb[3]] <= 0.0)
                    || (nb[4].k >= ib.lo.k && phi[p] * phi[nb[4]] <= 0.0)
                    || (nb[5].k < gb.hi.k && phi[p] * phi[nb[5]] <= 0.0);
                if hit {
                    band.level[p] = 1;
                }
                hit
            };
            if seeded {
                band.useful[p] = 1;
                band.active[p] = 1;
                band.useful_nodes.push(p);
                band.active_nodes.push(p);
            }
        }

        dom.exchange(comm, &mut band.level);
        self.import_ghost_band_nodes(dom, band, true);

        // 第 2 步：层 2..B
        self.propagate_narrow_band(dom, comm, band);

        // 第 3 步：带外截断
        self.cutoff_phi_outside_band(dom, comm, phi, band);
    }

    /// 交换层号后，吸收在邻接/域外幽灵处新变得有用的结点
    fn import_ghost_band_nodes(&self, dom: &SubDomain, band: &mut NarrowBand, activate: bool) {
        for &p in &dom.ghost_inner {
            if band.level[p] < i32::MAX && band.useful[p] == 0 {
                band.useful[p] = 1;
                band.useful_nodes.push(p);
                if activate {
                    band.active[p] = 1;
                    band.active_nodes.push(p);
                }
            }
        }
        for g in &dom.ghost_outer {
            let p = g.ijk;
            if band.level[p] < i32::MAX && band.useful[p] == 0 {
                band.useful[p] = 1;
                band.useful_nodes.push(p);
                if activate {
                    band.active[p] = 1;
                    band.active_nodes.push(p);
                }
            }
        }
    }

    /// 从层 0/1 向外扩展到带宽 B
    fn propagate_narrow_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        band: &mut NarrowBand,
    ) {
        let gb = dom.ghosted;
        let bandwidth = self.bandwidth as i32;

        for bandw in 2..=bandwidth {
            let size = band.useful_nodes.len();
            for n in 0..size {
                let p = band.useful_nodes[n];
                for (m, q) in p.axis_neighbors().iter().enumerate() {
                    let in_bounds = match m {
                        0 => q.i >= gb.lo.i,
                        1 => q.i < gb.hi.i,
                        2 => q.j >= gb.lo.j,
                        3 => q.j < gb.hi.j,
                        4 => q.k >= gb.lo.k,
                        _ => q.k < gb.hi.k,
                    };
                    if !in_bounds || dom.outside_physical_domain_and_unpopulated(*q) {
                        continue;
                    }
                    if band.level[*q] == i32::MAX {
                        band.level[*q] = bandw;
                        band.useful[*q] = 1;
                        band.useful_nodes.push(*q);
                        if bandw < bandwidth {
                            band.active[*q] = 1;
                            band.active_nodes.push(*q);
                        }
                    }
                }
            }

            dom.exchange(comm, &mut band.level);
            let activate = bandw < bandwidth;
            self.import_ghost_band_nodes(dom, band, activate);
        }
    }

    /// 带外 φ 截断为哨兵值；哨兵取带内极值的十倍
    fn cutoff_phi_outside_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        band: &NarrowBand,
    ) {
        let mut hi = [f64::MIN];
        let mut lo = [f64::MAX];
        for &p in &band.useful_nodes {
            hi[0] = hi[0].max(phi[p]);
            lo[0] = lo[0].min(phi[p]);
        }
        comm.allreduce_f64(&mut hi, ReduceOp::Max);
        comm.allreduce_f64(&mut lo, ReduceOp::Min);
        self.phi_max = hi[0];
        self.phi_min = lo[0];
        self.phi_out_pos = self.phi_max * 10.0;
        self.phi_out_neg = self.phi_min * 10.0;

        for p in dom.ghosted.iter() {
            if band.useful[p] == 0 {
                phi[p] = if phi[p] >= 0.0 { self.phi_out_pos } else { self.phi_out_neg };
            }
        }
        dom.exchange(comm, phi);
    }

    /// 界面移动后的窄带更新（假定层 0/1 已由第一层标记给出）
    fn update_narrow_band(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        phi: &mut Field3<f64>,
        first_layer_inc_ghost: &[Int3],
        band: &mut NarrowBand,
    ) {
        // 第 1 步：清掉旧带
        let backup = band.useful_nodes.clone();
        for &p in &backup {
            band.level[p] = i32::MAX;
            band.useful[p] = 0;
            band.active[p] = 0;
        }
        band.useful_nodes.clear();
        band.active_nodes.clear();

        // 第 2 步：新的层 0/1
        for &p in first_layer_inc_ghost {
            band.useful[p] = 1;
            band.active[p] = 1;
            band.useful_nodes.push(p);
            band.active_nodes.push(p);
            band.level[p] = if phi[p] == 0.0 { 0 } else { 1 };
        }

        // 第 3 步：层 2..B
        self.propagate_narrow_band(dom, comm, band);

        // 第 4 步：离开带的结点截断 φ 并清残量
        for &p in &backup {
            if band.useful[p] == 0 {
                phi[p] = if phi[p] >= 0.0 { self.phi_out_pos } else { self.phi_out_neg };
                self.res[p] = 0.0;
            }
        }

        // 第 5 步：新进带的结点若还带着哨兵值，换成带内极值附近，
        // 否则会拖慢收敛
        for &p in &band.useful_nodes {
            if phi[p] > 0.9 * self.phi_out_pos {
                phi[p] = self.phi_max * 1.1;
            } else if phi[p] < 0.9 * self.phi_out_neg {
                phi[p] = self.phi_min * 1.1;
            }
        }
    }
}

/// 第一层一侧差分（Hartmann 等 2008 的 Eq. 21a 简化形式）
///
/// 只使用 Tag = 1 的邻居；两侧都跨界时用曲率判据舍去误导的一侧。
#[allow(clippy::too_many_arguments)]
fn differentiate_in_first_layer(
    x0: f64,
    x1: f64,
    x2: f64,
    tag0: i32,
    tag2: i32,
    phi0: f64,
    phi1: f64,
    phi2: f64,
    phi00: f64,
    phi3: f64,
    eps: f64,
) -> f64 {
    let mut phi0_useful = tag0 != 0;
    let mut phi2_useful = tag2 != 0;
    if !phi0_useful && !phi2_useful {
        return 0.0;
    }

    let dphi0 = phi1 - phi0;
    let dphi1 = phi2 - phi1;

    let cond_b = dphi0 * dphi1 < 0.0 || phi0 * phi00 < 0.0 || phi2 * phi3 < 0.0;
    if cond_b {
        if phi0_useful && phi0 * phi2 < 0.0 && (dphi0 + eps).abs() < dphi1.abs() {
            phi0_useful = false;
        }
        if phi2_useful && phi0 * phi2 < 0.0 && (dphi1 + eps).abs() < dphi0.abs() {
            phi2_useful = false;
        }
    }

    match (phi0_useful, phi2_useful) {
        (true, true) => {
            let c0 = -(x2 - x1) / ((x1 - x0) * (x2 - x0));
            let c1 = 1.0 / (x1 - x0) - 1.0 / (x2 - x1);
            let c2 = (x1 - x0) / ((x2 - x0) * (x2 - x1));
            c0 * phi0 + c1 * phi1 + c2 * phi2
        }
        (true, false) => (phi1 - phi0) / (x1 - x0),
        (false, true) => (phi2 - phi1) / (x2 - x1),
        (false, false) => 0.0,
    }
}
