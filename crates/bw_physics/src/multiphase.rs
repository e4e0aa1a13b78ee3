// crates/bw_physics/src/multiphase.rs

//! 多材料算子
//!
//! 四件事：
//! 1. 由水平集推导材料编号（单一归属，重叠即致命）
//! 2. 界面移动后修复换相单元的状态（黎曼缓存或迎风外推），
//!    含逐级兜底
//! 3. 物理相变：规则检查、潜热簿记、φ 的第一层重写
//! 4. 水平集冲突消解与孤立背景单元清理
//!
//! 窄带层号走 6 连通，相变外推走 27 邻域；两者的连通性差异
//! 按原有行为保留。

use crate::eos::MaterialSet;
use crate::levelset::LevelSet;
use crate::schemes::RiemannSolutions;
use crate::state::Vec5;
use bw_config::{BoundaryCondKind, MultiPhaseConfig, PhaseChangeKind, SolverConfig, TransitionConfig};
use bw_foundation::{Axis, Box3, BwError, BwResult, Int3};
use bw_mesh::{Communicator, Field3, ReduceOp, SubDomain};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 相变规则
///
/// `transition` 允许在返回 false 时也修改状态与潜热累计（保持
/// 在转变温度上的压力钳制就是这种情形）。
pub trait PhaseTransitionRule: Send + Sync {
    fn from_id(&self) -> usize;
    fn to_id(&self) -> usize;
    fn transition(&self, v: &mut Vec5, lambda: &mut f64) -> bool;
}

/// 温度阈值相变（潜热累积式）
///
/// 超过转变温度后把过热焓计入 Λ 并把状态钳在转变温度；Λ 攒够
/// 潜热即翻相，余量回注新相的内能。
pub struct TemperatureTransition {
    from: usize,
    to: usize,
    t_trans: f64,
    latent_heat: f64,
    materials: Arc<MaterialSet>,
}

impl TemperatureTransition {
    pub fn new(cfg: &TransitionConfig, materials: Arc<MaterialSet>) -> Self {
        Self {
            from: cfg.from_id,
            to: cfg.to_id,
            t_trans: cfg.temperature,
            latent_heat: cfg.latent_heat,
            materials,
        }
    }
}

impl PhaseTransitionRule for TemperatureTransition {
    fn from_id(&self) -> usize {
        self.from
    }

    fn to_id(&self) -> usize {
        self.to
    }

    fn transition(&self, v: &mut Vec5, lambda: &mut f64) -> bool {
        let eos_from = self.materials.get(self.from);
        let rho = v.rho();
        let e = eos_from.internal_energy(rho, v.pressure());
        let t = eos_from.temperature(rho, e);
        if t <= self.t_trans {
            return false;
        }

        // 过热焓转入潜热累计，状态钳回转变温度
        let e_hold = eos_from.energy_from_temperature(rho, self.t_trans);
        *lambda += e - e_hold;
        v[4] = eos_from.pressure(rho, e_hold);

        if *lambda >= self.latent_heat {
            let excess = *lambda - self.latent_heat;
            *lambda = 0.0;
            let eos_to = self.materials.get(self.to);
            let e_new = eos_to.energy_from_temperature(rho, self.t_trans) + excess;
            v[4] = eos_to.pressure(rho, e_new);
            true
        } else {
            false
        }
    }
}

/// 多材料算子
pub struct MultiPhaseOperator {
    materials: Arc<MaterialSet>,
    cfg: MultiPhaseConfig,
    bc_kind: [BoundaryCondKind; 6],
    ls2matid: Vec<usize>,
    /// 按源材料编号索引的相变规则
    trans: Vec<Vec<Box<dyn PhaseTransitionRule>>>,
    /// 潜热累计场
    pub lambda: Field3<f64>,
    verbose: u8,
}

impl MultiPhaseOperator {
    pub fn new(
        dom: &SubDomain,
        cfg: &SolverConfig,
        materials: Arc<MaterialSet>,
        ls2matid: Vec<usize>,
    ) -> BwResult<Self> {
        let nmat = materials.len();
        let mut trans: Vec<Vec<Box<dyn PhaseTransitionRule>>> =
            (0..nmat).map(|_| Vec::new()).collect();
        for t in &cfg.transitions {
            if t.from_id >= nmat || t.to_id >= nmat || t.from_id == t.to_id {
                return Err(BwError::invalid_input(format!(
                    "bad phase transition {} -> {}",
                    t.from_id, t.to_id
                )));
            }
            for id in [t.from_id, t.to_id] {
                if id != 0 && !ls2matid.contains(&id) {
                    return Err(BwError::invalid_input(format!(
                        "phase transition involves material {id}, but no level set tracks it"
                    )));
                }
            }
            trans[t.from_id].push(Box::new(TemperatureTransition::new(t, Arc::clone(&materials))));
        }

        Ok(Self {
            materials,
            cfg: cfg.multiphase.clone(),
            bc_kind: [
                cfg.mesh.bc_x0,
                cfg.mesh.bc_xmax,
                cfg.mesh.bc_y0,
                cfg.mesh.bc_ymax,
                cfg.mesh.bc_z0,
                cfg.mesh.bc_zmax,
            ],
            ls2matid,
            trans,
            lambda: Field3::new(dom.ghosted, 0.0),
            verbose: cfg.output.verbose,
        })
    }

    pub fn has_transitions(&self) -> bool {
        self.trans.iter().any(|t| !t.is_empty())
    }

    // ============================================================
    // 材料编号推导
    // ============================================================

    /// 由水平集重推材料编号
    ///
    /// ID 清零后按序归属：φ_m < 0 的单元归材料 m。重叠计数做全局
    /// 求和，非零即致命。两个水平集同时恰为零时小编号材料获胜。
    pub fn update_material_id(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        level_sets: &[LevelSet],
        id: &mut Field3<i32>,
    ) -> BwResult<()> {
        id.fill(0);
        let mut overlap = [0i64];
        let ls_size = level_sets.len();

        for (ls, lset) in level_sets.iter().enumerate() {
            let matid = self.ls2matid[ls] as i32;
            for p in dom.ghosted.iter() {
                let phi = lset.phi[p];
                if phi < 0.0 {
                    if id[p] != 0 {
                        overlap[0] += 1;
                    }
                    id[p] = matid;
                } else if ls_size > 1 && phi == 0.0 {
                    // 恰在两个子域的界面上：给较小编号的材料
                    for other in level_sets.iter().skip(ls + 1) {
                        if other.phi[p] == 0.0 {
                            id[p] = matid;
                            break;
                        }
                    }
                }
            }
        }

        comm.allreduce_i64(&mut overlap, ReduceOp::Sum);
        if overlap[0] > 0 {
            return Err(BwError::fatal(format!(
                "Found overlapping material interfaces. Number of overlapped cells: {}",
                overlap[0]
            )));
        }

        dom.exchange(comm, id);
        Ok(())
    }

    // ============================================================
    // 相变后的状态修复
    // ============================================================

    /// 界面移动后修复换相单元的原始状态
    pub fn update_state_variables_after_interface_motion(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        idn: &Field3<i32>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
        riemann_solutions: &RiemannSolutions,
    ) -> BwResult<()> {
        match self.cfg.phase_change {
            PhaseChangeKind::RiemannSolution => {
                self.update_by_riemann_solutions(dom, comm, idn, id, v, riemann_solutions)?;
            }
            PhaseChangeKind::Extrapolation => {
                self.update_by_extrapolation(dom, comm, idn, id, v)?;
            }
        }

        if self.has_transitions() && self.cfg.latent_heat_transfer {
            self.add_lambda_to_enthalpy_after_interface_motion(dom, comm, idn, id, v);
        }
        Ok(())
    }

    fn update_by_riemann_solutions(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        idn: &Field3<i32>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
        rs: &RiemannSolutions,
    ) -> BwResult<()> {
        let mut unresolved = Vec::new();

        for p in dom.interior.iter() {
            if id[p] == idn[p] {
                continue;
            }
            let new_id = id[p] as usize;
            let updated = self
                .local_update_by_riemann_solutions(p, new_id, v, rs, true)
                .or_else(|| self.local_update_by_riemann_solutions(p, new_id, v, rs, false));
            match updated {
                Some(state) => v[p] = state,
                None => {
                    if self.verbose > 1 {
                        warn!(node = %p, "unable to update phase change by Riemann solutions; retrying");
                    }
                    unresolved.push(p);
                }
            }
        }

        dom.exchange(comm, v);

        let mut n = [unresolved.len() as i64];
        comm.allreduce_i64(&mut n, ReduceOp::Sum);
        if n[0] > 0 {
            self.fix_unresolved_nodes(&unresolved, dom, comm, idn, id, v)?;
        }
        Ok(())
    }

    /// 查询六个方向的半黎曼缓存，凑出加权状态
    ///
    /// 迎风模式下只采纳面法向速度指向本单元的缓存，权重
    /// |v·n|/|v|；非迎风模式一律权重 1。
    fn local_update_by_riemann_solutions(
        &self,
        p: Int3,
        new_id: usize,
        v: &Field3<Vec5>,
        rs: &RiemannSolutions,
        upwind: bool,
    ) -> Option<Vec5> {
        let mut acc = Vec5::ZERO;
        let mut sum_weight = 0.0;
        let mut counter = 0usize;

        // (缓存, 邻居, 法向分量, 指向本单元的符号)
        let probes = [
            (&rs.left, p.offset(Axis::X, -1), 1usize, 1.0f64),
            (&rs.right, p.offset(Axis::X, 1), 1, -1.0),
            (&rs.bottom, p.offset(Axis::Y, -1), 2, 1.0),
            (&rs.top, p.offset(Axis::Y, 1), 2, -1.0),
            (&rs.back, p.offset(Axis::Z, -1), 3, 1.0),
            (&rs.front, p.offset(Axis::Z, 1), 3, -1.0),
        ];

        for (cache, nbr, comp, sign) in probes {
            let Some((sol, sol_id)) = cache.get(&p) else {
                continue;
            };
            let vn = v[nbr];
            let un = vn[comp] * sign;
            if *sol_id != new_id || (upwind && un <= 0.0) {
                continue;
            }
            let weight = if upwind { un / vn.velocity().length() } else { 1.0 };
            sum_weight += weight;
            acc += *sol * weight;
            counter += 1;
        }

        (counter > 0 && sum_weight > 0.0).then(|| acc / sum_weight)
    }

    fn update_by_extrapolation(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        idn: &Field3<i32>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
    ) -> BwResult<()> {
        let mut unresolved = Vec::new();

        for p in dom.interior.iter() {
            if id[p] == idn[p] {
                continue;
            }
            let x0 = dom.coords[p];
            let mut sum_weight = 0.0;
            let mut acc = Vec5::ZERO;

            // 27 邻域里同新编号、自身未换相、位于上游的邻居
            for q in Box3::cell(p).grown(1).iter() {
                if id[q] != id[p] || id[q] != idn[q] || dom.outside_physical_domain(q) {
                    continue;
                }
                let mut v1 = v[q].velocity();
                let norm = v1.length();
                if norm != 0.0 {
                    v1 /= norm;
                }
                let x1x0 = (x0 - dom.coords[q]).normalize();
                let weight = x1x0.dot(v1).max(0.0);
                if weight > 0.0 {
                    sum_weight += weight;
                    acc += v[q] * weight;
                }
            }

            if sum_weight == 0.0 {
                if self.verbose > 1 {
                    warn!(node = %p, "unable to update phase change by extrapolation with upwinding");
                }
                unresolved.push(p);
            } else {
                v[p] = acc / sum_weight;
            }
        }

        dom.exchange(comm, v);

        let mut n = [unresolved.len() as i64];
        comm.allreduce_i64(&mut n, ReduceOp::Sum);
        if n[0] > 0 {
            self.fix_unresolved_nodes(&unresolved, dom, comm, idn, id, v)?;
        }
        Ok(())
    }

    /// 未决单元的逐级兜底
    ///
    /// 依次尝试：27 邻域迎风（剔除其他未决单元）→ 距离加权平均
    /// （不做迎风）→ 逐环外扩至十层找同材料密度（保速度、压力）。
    /// 全部失败时填兜底密度并计数，总数非零即致命。
    fn fix_unresolved_nodes(
        &self,
        unresolved: &[Int3],
        dom: &SubDomain,
        comm: &dyn Communicator,
        idn: &Field3<i32>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
    ) -> BwResult<()> {
        let unresolved_set: HashSet<Int3> = unresolved.iter().copied().collect();
        let mut failure = [0i64];
        const MAX_LAYER: i32 = 10;

        for &p in unresolved {
            let x0 = dom.coords[p];
            let mut sum_weight = 0.0;
            let mut acc = Vec5::ZERO;
            let mut sum_weight2 = 0.0;
            let mut vtmp = Vec5::ZERO;

            for q in Box3::cell(p).grown(1).iter() {
                if dom.outside_physical_domain(q)
                    || id[q] != id[p]
                    || q == p
                    || unresolved_set.contains(&q)
                {
                    continue;
                }

                let mut v1 = v[q].velocity();
                let norm = v1.length();
                if norm != 0.0 {
                    v1 /= norm;
                }
                let x1x0 = x0 - dom.coords[q];
                let dist = x1x0.length();
                let weight = (x1x0 / dist).dot(v1).max(0.0);
                if weight > 0.0 {
                    sum_weight += weight;
                    acc += v[q] * weight;
                }

                vtmp += v[q] * dist;
                sum_weight2 += dist;
            }

            if sum_weight > 0.0 {
                v[p] = acc / sum_weight;
                if self.verbose > 1 {
                    debug!(node = %p, "updated state variables by extrapolation with upwinding (2nd attempt)");
                }
                continue;
            }

            if sum_weight2 > 0.0 {
                v[p] = vtmp / sum_weight2;
                if self.verbose > 1 {
                    debug!(node = %p, "updated state variables by extrapolation without upwinding (2nd attempt)");
                }
                continue;
            }

            // 最后手段：保本单元速度与压力，逐环外扩找同材料密度
            let mut sum_w = 0.0;
            let mut density = 0.0;
            let mut found = false;
            for layer in 1..=MAX_LAYER {
                for q in Box3::cell(p).grown(layer).iter() {
                    if dom.outside_physical_domain(q)
                        || !dom.is_here(q, true)
                        || id[q] != id[p]
                        || q == p
                        || unresolved_set.contains(&q)
                    {
                        continue;
                    }
                    let dist = (dom.coords[q] - x0).length();
                    sum_w += dist;
                    density += dist * v[q][0];
                }
                if sum_w > 0.0 {
                    v[p][0] = density / sum_w;
                    found = true;
                    if self.verbose > 1 {
                        debug!(node = %p, layer, "updated density by ring interpolation");
                    }
                    break;
                }
            }

            if !found {
                let failsafe = self.materials.get(id[p] as usize).failsafe_density();
                warn!(
                    node = %p,
                    failsafe,
                    from = idn[p],
                    to = id[p],
                    "updating phase change with pre-specified density; no valid neighbors within 10 layers"
                );
                v[p][0] = failsafe;
                failure[0] += 1;
            }
        }

        comm.allreduce_i64(&mut failure, ReduceOp::Sum);
        if failure[0] > 0 {
            return Err(BwError::fatal(format!(
                "Phase-change update failed at {} node(s) after exhausting all fallbacks",
                failure[0]
            )));
        }

        dom.exchange(comm, v);
        Ok(())
    }

    // ============================================================
    // 物理相变
    // ============================================================

    /// 检查物理相变并更新 ID、V、Λ 与受影响的 φ
    ///
    /// 返回全局发生相变的结点数；非零时所有受影响的水平集都需要
    /// 随后重初始化（由调用方完成）。
    pub fn update_phase_transitions(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        level_sets: &mut [LevelSet],
        id: &mut Field3<i32>,
        v: &mut Field3<Vec5>,
        phi_updated: &mut [bool],
        new_useful_nodes: &mut [Vec<Int3>],
    ) -> BwResult<usize> {
        if !self.has_transitions() {
            return Ok(0);
        }

        let (nx, ny, nz) = dom.global_size();
        let mut counter = [0i64];
        let mut changed: Vec<(Int3, usize, usize)> = Vec::new();
        let mut affected: BTreeSet<usize> = BTreeSet::new();

        // Λ 暂时移出，避免与规则表的借用冲突
        let mut lambda = std::mem::replace(
            &mut self.lambda,
            Field3::new(Box3::new(Int3::default(), Int3::default()), 0.0),
        );

        for p in dom.ghosted.iter() {
            if dom.outside_physical_domain(p) {
                continue;
            }
            let myid = id[p] as usize;
            let mut accepted: Option<usize> = None;
            for rule in &self.trans[myid] {
                // 注意：返回 false 时 v 与 Λ 也可能被修改
                if rule.transition(&mut v[p], &mut lambda[p]) {
                    accepted = Some(rule.to_id());
                    break;
                }
            }
            let Some(to) = accepted else {
                continue;
            };

            changed.push((p, myid, to));
            affected.insert(myid);
            affected.insert(to);
            id[p] = to as i32;

            info!(node = %p, from = myid, to, "detected phase transition");

            // 贴壁/对称边界的幽灵跟随换相（V 由边界条件更新）
            let mirrors = [
                (p.i == 0, self.bc_kind[0], p.offset(Axis::X, -1)),
                (p.i == nx - 1, self.bc_kind[1], p.offset(Axis::X, 1)),
                (p.j == 0, self.bc_kind[2], p.offset(Axis::Y, -1)),
                (p.j == ny - 1, self.bc_kind[3], p.offset(Axis::Y, 1)),
                (p.k == 0, self.bc_kind[4], p.offset(Axis::Z, -1)),
                (p.k == nz - 1, self.bc_kind[5], p.offset(Axis::Z, 1)),
            ];
            for (on_face, bc, ghost) in mirrors {
                if on_face
                    && matches!(bc, BoundaryCondKind::Wall | BoundaryCondKind::Symmetry)
                    && dom.ghosted.contains(ghost)
                {
                    id[ghost] = id[p];
                }
            }

            counter[0] += 1;
        }

        self.lambda = lambda;

        comm.allreduce_i64(&mut counter, ReduceOp::Sum);
        dom.exchange(comm, &mut self.lambda);

        if counter[0] == 0 {
            return Ok(0);
        }
        dom.exchange(comm, id);
        dom.exchange(comm, v);

        // 哪些水平集需要更新
        let mut flags: Vec<i64> = self
            .ls2matid
            .iter()
            .map(|m| i64::from(affected.contains(m)))
            .collect();
        comm.allreduce_i64(&mut flags, ReduceOp::Max);
        for (u, f) in phi_updated.iter_mut().zip(flags.iter()) {
            *u = *f != 0;
        }

        self.update_phi_after_phase_transitions(
            dom,
            comm,
            level_sets,
            &changed,
            phi_updated,
            new_useful_nodes,
        );

        if self.verbose >= 1 {
            info!(nodes = counter[0], "detected phase/material transitions");
        }
        Ok(counter[0] as usize)
    }

    /// 相变后的 φ 重写
    ///
    /// 只保证第一层（到 dx 误差）正确：换相单元写 ±0.5·min(dxyz)，
    /// 反号的轴向邻居收拢到 ±0.5·dx。之后必须重初始化。
    fn update_phi_after_phase_transitions(
        &self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        level_sets: &mut [LevelSet],
        changed: &[(Int3, usize, usize)],
        phi_updated: &[bool],
        new_useful_nodes: &mut [Vec<Int3>],
    ) {
        let (nx, ny, nz) = dom.global_size();
        let gb = dom.ghosted;

        for (ls, lset) in level_sets.iter_mut().enumerate() {
            if !phi_updated[ls] {
                continue;
            }
            let matid = self.ls2matid[ls];

            for &(p, from, to) in changed {
                if matid != from && matid != to {
                    continue;
                }

                new_useful_nodes[ls].push(p);
                for q in p.axis_neighbors() {
                    if gb.contains(q) {
                        new_useful_nodes[ls].push(q);
                    }
                }

                let inside_domain = |q: Int3| {
                    q.i >= 0 && q.i < nx && q.j >= 0 && q.j < ny && q.k >= 0 && q.k < nz
                };

                if matid == from {
                    // 本单元移出该材料
                    lset.phi[p] = 0.5 * dom.min_spacing(p);
                    for (n, q) in p.axis_neighbors().iter().enumerate() {
                        if !gb.contains(*q) || !inside_domain(*q) {
                            continue;
                        }
                        let d = dom.dxyz[*q][n / 2];
                        if lset.phi[*q] <= 0.0 {
                            lset.phi[*q] = lset.phi[*q].max(-0.5 * d);
                        }
                    }
                } else {
                    // 本单元移入该材料
                    lset.phi[p] = -0.5 * dom.min_spacing(p);
                    for (n, q) in p.axis_neighbors().iter().enumerate() {
                        if !gb.contains(*q) || !inside_domain(*q) {
                            continue;
                        }
                        let d = dom.dxyz[*q][n / 2];
                        if lset.phi[*q] >= 0.0 {
                            lset.phi[*q] = lset.phi[*q].min(0.5 * d);
                        }
                    }
                }
            }

            dom.exchange(comm, &mut lset.phi);
        }
    }

    /// 界面移动换相后把攒下的潜热加回焓
    fn add_lambda_to_enthalpy_after_interface_motion(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        idn: &Field3<i32>,
        id: &Field3<i32>,
        v: &mut Field3<Vec5>,
    ) {
        let mut counter = [0i64];
        let mut lambda = std::mem::replace(
            &mut self.lambda,
            Field3::new(Box3::new(Int3::default(), Int3::default()), 0.0),
        );

        for p in dom.interior.iter() {
            let myidn = idn[p] as usize;
            let myid = id[p] as usize;
            if myidn == myid || lambda[p] <= 0.0 {
                continue;
            }

            for rule in &self.trans[myidn] {
                if rule.to_id() != myid {
                    continue;
                }
                let eos = self.materials.get(myid);
                let rho = v[p].rho();
                let pres = v[p].pressure();
                let e = eos.internal_energy(rho, pres);
                let h = e + pres / rho + lambda[p];
                lambda[p] = 0.0;
                let e_new = eos.energy_from_enthalpy(rho, h);
                v[p][4] = eos.pressure(rho, e_new);
                counter[0] += 1;
            }
        }

        self.lambda = lambda;

        comm.allreduce_i64(&mut counter, ReduceOp::Sum);
        if counter[0] > 0 {
            dom.exchange(comm, &mut self.lambda);
            dom.exchange(comm, v);
        }
    }

    // ============================================================
    // 冲突消解
    // ============================================================

    /// 水平集冲突消解
    ///
    /// 多个水平集都声称拥有的单元：|φ| 最大者成为唯一归属，竞争
    /// 方的 |φ| 改写为均值（归属者取负）。单归属与零归属的界面
    /// 单元不动。可选的孤立背景单元清理按步频进行。
    ///
    /// 返回全局消解的冲突数。
    pub fn resolve_conflicts_in_level_sets(
        &self,
        time_step: usize,
        dom: &SubDomain,
        comm: &dyn Communicator,
        level_sets: &mut [LevelSet],
    ) -> usize {
        let ls_size = level_sets.len();
        if ls_size == 0 {
            return 0;
        }

        let mut resolved = [0i64];
        let gb = dom.ghosted;

        // ------------------------------------------
        // 第一部分：被多个子域同时覆盖的单元
        // ------------------------------------------
        if ls_size >= 2 {
            for p in gb.iter() {
                let mut boundaries: Vec<usize> = Vec::new();
                for (ls, lset) in level_sets.iter().enumerate() {
                    let phi = &lset.phi;
                    let nb = p.axis_neighbors();
                    let hit = (nb[0].i >= gb.lo.i && phi[p] * phi[nb[0]] <= 0.0)
                        || (nb[1].i < gb.hi.i && phi[p] * phi[nb[1]] <= 0.0)
                        || (nb[2].j >= gb.lo.j && phi[p] * phi[nb[2]] <= 0.0)
                        || (nb[3].j < gb.hi.j && phi[p] * phi[nb[3]] <= 0.0)
                        || (nb[4].k >= gb.lo.k && phi[p] * phi[nb[4]] <= 0.0)
                        || (nb[5].k < gb.hi.k && phi[p] * phi[nb[5]] <= 0.0);
                    if hit {
                        boundaries.push(ls);
                    }
                }
                if boundaries.len() <= 1 {
                    continue;
                }

                let owners: Vec<usize> = boundaries
                    .iter()
                    .copied()
                    .filter(|&ls| level_sets[ls].phi[p] < 0.0)
                    .collect();
                let inters: Vec<usize> = boundaries
                    .iter()
                    .copied()
                    .filter(|&ls| level_sets[ls].phi[p] == 0.0)
                    .collect();

                if owners.is_empty() && inters.is_empty() {
                    continue; // 不属于任何子域
                }
                if owners.len() <= 1 {
                    continue; // 单归属或仅在界面上：保持不动
                }

                // 1. 选出唯一归属：|φ| 最大者
                let mut new_owner = owners[0];
                let mut max_phi = level_sets[owners[0]].phi[p].abs();
                for &ls in &owners[1..] {
                    let a = level_sets[ls].phi[p].abs();
                    if a > max_phi {
                        new_owner = ls;
                        max_phi = a;
                    }
                }

                // 2. 新的 |φ|：竞争方绝对值的均值
                let new_phi = owners
                    .iter()
                    .map(|&ls| level_sets[ls].phi[p].abs())
                    .sum::<f64>()
                    / owners.len() as f64;

                // 3. 写回所有竞争方
                for &ls in &owners {
                    level_sets[ls].phi[p] = if ls == new_owner { -new_phi } else { new_phi };
                }

                resolved[0] += 1;
            }
        }

        // ------------------------------------------
        // 第二部分：困在界面之间的孤立背景单元（可选）
        // ------------------------------------------
        let freq = self.cfg.resolve_isolated_cells_frequency;
        if freq > 0 && time_step % freq == 0 {
            let (nx, ny, nz) = dom.global_size();

            for p in dom.interior.iter() {
                let background = level_sets.iter().all(|l| l.phi[p] >= 0.0);
                if !background {
                    continue;
                }

                // 气（背景连通度）：至少两个连通的背景邻居就不算孤立
                let mut qi = 0;
                let mut enough = false;
                for (n, q) in p.axis_neighbors().iter().enumerate() {
                    let inside = match n {
                        0 => q.i >= 0,
                        1 => q.i < nx,
                        2 => q.j >= 0,
                        3 => q.j < ny,
                        4 => q.k >= 0,
                        _ => q.k < nz,
                    };
                    if !inside {
                        continue;
                    }
                    let connected = level_sets.iter().all(|l| l.phi[*q] >= 0.0);
                    if connected {
                        qi += 1;
                        if qi >= 2 {
                            enough = true;
                            break;
                        }
                    }
                }
                if enough {
                    continue;
                }

                // 松弛变体：单连通单元只在偶数步翻转
                if qi == 1 && (time_step % 2) * freq != 0 {
                    continue;
                }

                // 孤立背景单元：翻给最近的材料
                let mut new_owner = 0usize;
                let mut min_phi = f64::MAX;
                for (ls, lset) in level_sets.iter().enumerate() {
                    if lset.phi[p] < min_phi {
                        min_phi = lset.phi[p];
                        new_owner = ls;
                    }
                }
                debug_assert!(min_phi >= 0.0);
                level_sets[new_owner].phi[p] = -min_phi;
                resolved[0] += 1;
            }
        }

        comm.allreduce_i64(&mut resolved, ReduceOp::Sum);

        if resolved[0] > 0 {
            for lset in level_sets.iter_mut() {
                dom.exchange(comm, &mut lset.phi);
            }
        }

        resolved[0] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_config::{
        EosConfig, LevelSetBc, LevelSetConfig, MaterialConfig, ReinitConfig, SolverConfig,
    };
    use bw_mesh::{GlobalMesh, SoloComm};

    fn material(name: &str) -> MaterialConfig {
        MaterialConfig {
            name: name.into(),
            eos: EosConfig::StiffenedGas {
                gamma: 1.4,
                pressure_constant: 0.0,
                cv: 1.0,
                e_ref: 0.0,
            },
            rho_min: 1e-12,
            p_min: 1e-12,
            failsafe_density: 1e-6,
        }
    }

    fn ls_config(matid: usize) -> LevelSetConfig {
        LevelSetConfig {
            material_id: matid,
            bandwidth: 0,
            bc: LevelSetBc::ZeroNeumann,
            reinit: ReinitConfig::default(),
        }
    }

    fn setup(nmat: usize, n_ls: usize) -> (SubDomain, MultiPhaseOperator, Vec<LevelSet>) {
        let mut cfg = SolverConfig::default();
        for m in 0..nmat {
            cfg.materials.push(material(&format!("m{m}")));
        }
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 8, 8, 8).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let mats = Arc::new(MaterialSet::from_config(&cfg.materials));
        let ls2matid: Vec<usize> = (1..=n_ls).collect();
        let level_sets: Vec<LevelSet> =
            ls2matid.iter().map(|&m| LevelSet::new(&dom, ls_config(m))).collect();
        let mpo = MultiPhaseOperator::new(&dom, &cfg, mats, ls2matid).unwrap();
        (dom, mpo, level_sets)
    }

    #[test]
    fn test_update_material_id_basic() {
        let (dom, mpo, mut lss) = setup(2, 1);
        let comm = SoloComm;
        // 左半边属于材料 1
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = dom.coords[p].x - 0.5;
        }
        let mut id = Field3::new(dom.ghosted, 0i32);
        mpo.update_material_id(&dom, &comm, &lss, &mut id).unwrap();
        assert_eq!(id[Int3::new(0, 4, 4)], 1);
        assert_eq!(id[Int3::new(7, 4, 4)], 0);
    }

    #[test]
    fn test_update_material_id_idempotent() {
        let (dom, mpo, mut lss) = setup(2, 1);
        let comm = SoloComm;
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = (dom.coords[p] - glam::DVec3::splat(0.5)).length() - 0.3;
        }
        let mut id1 = Field3::new(dom.ghosted, 0i32);
        mpo.update_material_id(&dom, &comm, &lss, &mut id1).unwrap();
        let mut id2 = id1.clone();
        mpo.update_material_id(&dom, &comm, &lss, &mut id2).unwrap();
        for p in dom.ghosted.iter() {
            assert_eq!(id1[p], id2[p]);
        }
    }

    #[test]
    fn test_overlap_is_fatal() {
        let (dom, mpo, mut lss) = setup(3, 2);
        let comm = SoloComm;
        // 两个水平集都声称拥有同一批单元
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = -1.0;
            lss[1].phi[p] = -1.0;
        }
        let mut id = Field3::new(dom.ghosted, 0i32);
        let err = mpo.update_material_id(&dom, &comm, &lss, &mut id).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_conflict_resolution_two_owners() {
        let (dom, mpo, mut lss) = setup(3, 2);
        let comm = SoloComm;
        // 背景为正，一个冲突单元两个水平集都为负（-0.1 与 -0.2）
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = 0.4;
            lss[1].phi[p] = 0.4;
        }
        let c = Int3::new(4, 4, 4);
        lss[0].phi[c] = -0.1;
        lss[1].phi[c] = -0.2;

        let resolved = mpo.resolve_conflicts_in_level_sets(1, &dom, &comm, &mut lss);
        assert_eq!(resolved, 1);
        // |φ| 大者（水平集 1）成为归属，较小者翻正；均值 0.15 且
        // 绝对值之和保持 0.3
        assert!((lss[0].phi[c] - 0.15).abs() < 1e-12);
        assert!((lss[1].phi[c] + 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_conflict_resolution_single_owner_untouched() {
        let (dom, mpo, mut lss) = setup(3, 2);
        let comm = SoloComm;
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = 0.4;
            lss[1].phi[p] = 0.4;
        }
        let c = Int3::new(4, 4, 4);
        lss[0].phi[c] = -0.1; // 只有一个归属

        let resolved = mpo.resolve_conflicts_in_level_sets(1, &dom, &comm, &mut lss);
        assert_eq!(resolved, 0);
        assert!((lss[0].phi[c] + 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_riemann_cache_update() {
        let (dom, mut mpo, _lss) = setup(2, 1);
        let comm = SoloComm;
        let p = Int3::new(4, 4, 4);

        let mut idn = Field3::new(dom.ghosted, 0i32);
        let mut id = Field3::new(dom.ghosted, 0i32);
        idn[p] = 0;
        id[p] = 1; // 本单元换相 0 → 1

        let mut v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.5, 0.0, 0.0, 1.0));
        let mut rs = RiemannSolutions::new();
        // 左面缓存：材料 1 的解，邻居速度向右（流入本单元）
        rs.left.insert(p, (Vec5::new(2.0, 0.5, 0.0, 0.0, 3.0), 1));

        mpo.update_state_variables_after_interface_motion(&dom, &comm, &idn, &id, &mut v, &rs)
            .unwrap();
        assert!((v[p][0] - 2.0).abs() < 1e-14);
        assert!((v[p][4] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_riemann_cache_rejects_wrong_id_then_falls_back() {
        let (dom, mut mpo, _lss) = setup(2, 1);
        let comm = SoloComm;
        let p = Int3::new(4, 4, 4);

        let mut idn = Field3::new(dom.ghosted, 1i32);
        idn[p] = 0;
        let id = Field3::new(dom.ghosted, 1i32);

        // 邻居全是材料 1 且未换相，速度指向 p（+x 方向）
        let mut v = Field3::new(dom.ghosted, Vec5::new(4.0, 1.0, 0.0, 0.0, 2.0));
        v[p] = Vec5::new(9.0, 9.0, 9.0, 9.0, 9.0);
        let mut rs = RiemannSolutions::new();
        // 缓存的材料编号不匹配（0 ≠ 新编号 1）→ 不采纳 → 走兜底
        rs.left.insert(p, (Vec5::new(7.0, 1.0, 0.0, 0.0, 7.0), 0));

        mpo.update_state_variables_after_interface_motion(&dom, &comm, &idn, &id, &mut v, &rs)
            .unwrap();
        // 兜底的迎风外推应从上游邻居取值
        assert!((v[p][0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolation_upwind_takes_upstream_neighbor() {
        let (dom, mut mpo, _lss) = setup(2, 1);
        mpo.cfg.phase_change = PhaseChangeKind::Extrapolation;
        let comm = SoloComm;
        let p = Int3::new(4, 4, 4);

        let mut idn = Field3::new(dom.ghosted, 1i32);
        idn[p] = 0;
        let id = Field3::new(dom.ghosted, 1i32);

        let mut v = Field3::new(dom.ghosted, Vec5::ZERO);
        // 流动朝 +x：上游（i<4）的邻居才有正权重
        for p2 in dom.ghosted.iter() {
            let rho = if p2.i < 4 { 2.0 } else { 5.0 };
            v[p2] = Vec5::new(rho, 1.0, 0.0, 0.0, 1.0);
        }
        v[p] = Vec5::new(9.0, 1.0, 0.0, 0.0, 9.0);

        let rs = RiemannSolutions::new();
        mpo.update_state_variables_after_interface_motion(&dom, &comm, &idn, &id, &mut v, &rs)
            .unwrap();
        assert!((v[p][0] - 2.0).abs() < 1e-12, "rho = {}", v[p][0]);
    }

    #[test]
    fn test_diagonal_only_neighborhood_resolves() {
        // 回归：窄带层号走 6 连通，但相变外推要能用对角邻居
        let (dom, mut mpo, _lss) = setup(2, 1);
        mpo.cfg.phase_change = PhaseChangeKind::Extrapolation;
        let comm = SoloComm;
        let p = Int3::new(4, 4, 4);

        let mut idn = Field3::new(dom.ghosted, 0i32);
        let mut id = Field3::new(dom.ghosted, 0i32);
        idn[p] = 0;
        id[p] = 1;
        // 只有一个对角邻居是材料 1
        let diag = Int3::new(3, 3, 3);
        id[diag] = 1;
        idn[diag] = 1;

        let mut v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.0, 0.0, 0.0, 1.0));
        // 对角邻居的速度指向 p
        v[diag] = Vec5::new(2.5, 1.0, 1.0, 1.0, 2.0);
        v[p] = Vec5::new(9.0, 0.0, 0.0, 0.0, 9.0);

        let rs = RiemannSolutions::new();
        mpo.update_state_variables_after_interface_motion(&dom, &comm, &idn, &id, &mut v, &rs)
            .unwrap();
        assert!((v[p][0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_phase_transition_on_symmetry_boundary() {
        // 对称边界处发生相变：幽灵单元的 ID 跟随，Λ 归零
        let mut cfg = SolverConfig::default();
        cfg.materials.push(material("liquid"));
        cfg.materials.push(material("vapor"));
        cfg.mesh.bc_x0 = BoundaryCondKind::Symmetry;
        cfg.transitions.push(TransitionConfig {
            from_id: 0,
            to_id: 1,
            temperature: 2.0,
            latent_heat: 0.5,
        });

        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 8, 8, 8).unwrap();
        let dom = SubDomain::solo(Arc::new(gm));
        let mats = Arc::new(MaterialSet::from_config(&cfg.materials));
        let mut lss = vec![LevelSet::new(&dom, ls_config(1))];
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = 1.0; // 材料 1 远离；全域都是材料 0
        }
        let mut mpo = MultiPhaseOperator::new(&dom, &cfg, mats, vec![1]).unwrap();

        let comm = SoloComm;
        let mut id = Field3::new(dom.ghosted, 0i32);
        // 背景低温；边界单元 (0,3,3) 高温高能 → 触发相变
        let mut v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.0, 0.0, 0.0, 0.4));
        let hot = Int3::new(0, 3, 3);
        // e = p/((γ-1)ρ) → p = 4.0 给 e = 10 > t_trans + latent
        v[hot] = Vec5::new(1.0, 0.0, 0.0, 0.0, 4.0);

        let mut phi_updated = vec![false];
        let mut new_nodes = vec![Vec::new()];
        let n = mpo
            .update_phase_transitions(&dom, &comm, &mut lss, &mut id, &mut v, &mut phi_updated, &mut new_nodes)
            .unwrap();

        assert_eq!(n, 1);
        assert_eq!(id[hot], 1);
        // 对称幽灵跟随
        assert_eq!(id[Int3::new(-1, 3, 3)], id[hot]);
        // Λ 在接受时归零
        assert_eq!(mpo.lambda[hot], 0.0);
        // φ 第一层重写：换相单元为负（进入材料 1），邻居收拢
        assert!(lss[0].phi[hot] < 0.0);
        assert!(phi_updated[0]);
        assert!(!new_nodes[0].is_empty());
    }

    #[test]
    fn test_isolated_background_cell_flipped() {
        let (dom, mut mpo, mut lss) = setup(2, 1);
        mpo.cfg.resolve_isolated_cells_frequency = 1;
        let comm = SoloComm;
        // 全域属材料 1，只留 (4,4,4) 一个背景单元
        for p in dom.ghosted.iter() {
            lss[0].phi[p] = -0.5;
        }
        let c = Int3::new(4, 4, 4);
        lss[0].phi[c] = 0.2;

        let resolved = mpo.resolve_conflicts_in_level_sets(2, &dom, &comm, &mut lss);
        assert_eq!(resolved, 1);
        assert!((lss[0].phi[c] + 0.2).abs() < 1e-15);
    }
}
