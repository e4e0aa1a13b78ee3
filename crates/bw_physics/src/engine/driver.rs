// crates/bw_physics/src/engine/driver.rs

//! 求解器装配与主循环胶水
//!
//! 把网格、空间算子、水平集、多材料算子与时间积分器装配成一个
//! [`Simulation`]；每步：CFL 时间步 → RK 推进 → 冲突消解（按步频）
//! → 相变 → 受影响水平集的重初始化。

use crate::engine::integrator::TimeIntegrator;
use crate::eos::MaterialSet;
use crate::levelset::LevelSet;
use crate::multiphase::MultiPhaseOperator;
use crate::spatial::SpaceOperator;
use crate::state::Vec5;
use bw_config::SolverConfig;
use bw_foundation::{BwError, BwResult, Int3};
use bw_mesh::{CartDecomp, Communicator, Field3, GlobalMesh, SubDomain};
use std::sync::Arc;
use tracing::info;

/// 单步摘要
#[derive(Debug, Clone, Copy)]
pub struct StepInfo {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub cfl: f64,
}

/// 装配完成的求解器实例（一个 rank 一份）
pub struct Simulation {
    pub dom: SubDomain,
    pub spo: SpaceOperator,
    pub mpo: MultiPhaseOperator,
    pub level_sets: Vec<LevelSet>,
    pub v: Field3<Vec5>,
    pub id: Field3<i32>,
    integrator: TimeIntegrator,
    cfg: SolverConfig,
    pub time: f64,
    pub step: usize,
}

impl Simulation {
    /// 由配置装配；`comm` 决定本 rank 在分解中的位置
    pub fn new(cfg: &SolverConfig, comm: &dyn Communicator) -> BwResult<Self> {
        cfg.validate()
            .map_err(|e| BwError::invalid_input(e.to_string()))?;

        let m = &cfg.mesh;
        let global = Arc::new(GlobalMesh::uniform(
            m.x0, m.xmax, m.y0, m.ymax, m.z0, m.zmax, m.nx, m.ny, m.nz,
        )?);
        let decomp = CartDecomp::new(
            cfg.partition.px,
            cfg.partition.py,
            cfg.partition.pz,
            m.nx,
            m.ny,
            m.nz,
        )?;
        if decomp.num_ranks() != comm.size() {
            return Err(BwError::invalid_input(format!(
                "partition wants {} ranks but communicator has {}",
                decomp.num_ranks(),
                comm.size()
            )));
        }
        let dom = SubDomain::new(global, decomp, comm.rank());

        let materials = Arc::new(MaterialSet::from_config(&cfg.materials));
        let spo = SpaceOperator::new(&dom, cfg, Arc::clone(&materials));

        let mut v = Field3::new(dom.ghosted, Vec5::ZERO);
        let mut id = Field3::new(dom.ghosted, 0i32);
        spo.set_initial_condition(&dom, comm, &mut v, &mut id, &cfg.initial_conditions);

        let mut level_sets: Vec<LevelSet> = Vec::with_capacity(cfg.level_sets.len());
        for ls_cfg in &cfg.level_sets {
            let mut ls = LevelSet::new(&dom, ls_cfg.clone());
            ls.set_initial_condition(&dom, comm, &cfg.initial_conditions);
            info!(
                material = ls.material_id,
                bandwidth = ls_cfg.bandwidth,
                "initialized level set"
            );
            level_sets.push(ls);
        }

        let ls2matid: Vec<usize> = level_sets.iter().map(|l| l.material_id).collect();
        let mpo = MultiPhaseOperator::new(&dom, cfg, materials, ls2matid)?;

        // 让 ID 与水平集一致（同时填好域外幽灵）
        mpo.update_material_id(&dom, comm, &level_sets, &mut id)?;
        // 初值区域直接给了 ID 的地方以水平集为准；残余换相单元的
        // 状态本来就由初值区域写好
        spo.apply_boundary_conditions(&dom, &mut v);

        let integrator = TimeIntegrator::new(&dom, cfg.time.integrator, level_sets.len());

        Ok(Self {
            dom,
            spo,
            mpo,
            level_sets,
            v,
            id,
            integrator,
            cfg: cfg.clone(),
            time: 0.0,
            step: 0,
        })
    }

    /// 是否到达终止条件
    pub fn done(&self) -> bool {
        self.time >= self.cfg.time.max_time || self.step >= self.cfg.time.max_steps
    }

    /// 推进一个时间步
    pub fn advance(&mut self, comm: &dyn Communicator) -> BwResult<StepInfo> {
        self.step += 1;

        let (mut dt, mut cfl) =
            self.spo
                .compute_time_step(&self.dom, comm, &self.v, &self.id, &self.cfg.time);

        // 末步收口到 max_time
        if self.time + dt >= self.cfg.time.max_time {
            let clipped = self.cfg.time.max_time - self.time;
            cfl *= clipped / dt;
            dt = clipped;
        }

        self.integrator.advance_one_time_step(
            &self.dom,
            comm,
            &mut self.spo,
            &mut self.mpo,
            &mut self.level_sets,
            &mut self.v,
            &mut self.id,
            dt,
        )?;
        self.time += dt;

        // 冲突消解（按步频）
        let freq = self.cfg.multiphase.resolve_conflicts_frequency;
        if !self.level_sets.is_empty() && freq > 0 && self.step % freq == 0 {
            let resolved = self.mpo.resolve_conflicts_in_level_sets(
                self.step,
                &self.dom,
                comm,
                &mut self.level_sets,
            );
            if resolved > 0 {
                info!(resolved, "resolved level set conflicts");
                self.mpo
                    .update_material_id(&self.dom, comm, &self.level_sets, &mut self.id)?;
            }
        }

        // 物理相变
        let n_ls = self.level_sets.len();
        let mut phi_updated = vec![false; n_ls];
        let mut new_nodes: Vec<Vec<Int3>> = vec![Vec::new(); n_ls];
        let n_trans = self.mpo.update_phase_transitions(
            &self.dom,
            comm,
            &mut self.level_sets,
            &mut self.id,
            &mut self.v,
            &mut phi_updated,
            &mut new_nodes,
        )?;

        // 重初始化：相变波及的水平集必做，其余按步频
        for (ls, lset) in self.level_sets.iter_mut().enumerate() {
            let mandatory = n_trans > 0 && phi_updated[ls];
            if mandatory {
                lset.absorb_new_useful_nodes(&self.dom, &new_nodes[ls]);
            }
            let freq = lset.config.reinit.frequency;
            if mandatory || (freq > 0 && self.step % freq == 0) {
                lset.reinitialize(&self.dom, comm);
            }
        }

        Ok(StepInfo {
            step: self.step,
            time: self.time,
            dt,
            cfl,
        })
    }
}
