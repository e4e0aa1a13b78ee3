// crates/bw_physics/src/engine/integrator.rs

//! 显式时间积分器
//!
//! SSP 形式的凸组合阶段：U^(s) = α U^n + (1-α)(U^(s-1) + Δt·L)。
//! 每个阶段：残量装配（含半黎曼缓存）→ 守恒量更新 → 原始量转换
//! （裁剪 + 双曲性检查）→ 水平集推进 → 材料编号重推与换相修复。
//! 最末阶段之后由 driver 触发冲突消解、相变与重初始化。

use crate::levelset::LevelSet;
use crate::multiphase::MultiPhaseOperator;
use crate::schemes::RiemannSolutions;
use crate::spatial::SpaceOperator;
use crate::state::Vec5;
use bw_config::IntegratorKind;
use bw_foundation::BwResult;
use bw_mesh::{Communicator, Field3, SubDomain};

/// 显式时间积分器
pub struct TimeIntegrator {
    alphas: &'static [f64],
    u0: Field3<Vec5>,
    u: Field3<Vec5>,
    r: Field3<Vec5>,
    idn: Field3<i32>,
    rs: RiemannSolutions,
    phi0: Vec<Field3<f64>>,
    rphi: Vec<Field3<f64>>,
}

impl TimeIntegrator {
    pub fn new(dom: &SubDomain, kind: IntegratorKind, n_level_sets: usize) -> Self {
        let alphas: &'static [f64] = match kind {
            IntegratorKind::ForwardEuler => &[0.0],
            IntegratorKind::RungeKutta2 => &[0.0, 0.5],
            IntegratorKind::RungeKutta3 => &[0.0, 0.75, 1.0 / 3.0],
        };
        Self {
            alphas,
            u0: Field3::new(dom.ghosted, Vec5::ZERO),
            u: Field3::new(dom.ghosted, Vec5::ZERO),
            r: Field3::new(dom.ghosted, Vec5::ZERO),
            idn: Field3::new(dom.ghosted, 0),
            rs: RiemannSolutions::new(),
            phi0: (0..n_level_sets).map(|_| Field3::new(dom.ghosted, 0.0)).collect(),
            rphi: (0..n_level_sets).map(|_| Field3::new(dom.ghosted, 0.0)).collect(),
        }
    }

    /// 推进一个时间步（不含步末的冲突消解/相变/重初始化）
    #[allow(clippy::too_many_arguments)]
    pub fn advance_one_time_step(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        spo: &mut SpaceOperator,
        mpo: &mut MultiPhaseOperator,
        level_sets: &mut [LevelSet],
        v: &mut Field3<Vec5>,
        id: &mut Field3<i32>,
        dt: f64,
    ) -> BwResult<()> {
        // 步首快照
        spo.primitive_to_conservative(dom, comm, v, id, &mut self.u0, false);
        for (ls, lset) in level_sets.iter().enumerate() {
            self.phi0[ls].copy_from(&lset.phi);
        }

        for &alpha in self.alphas {
            // 残量（阶段首的场）
            spo.compute_residual(dom, comm, v, id, &mut self.r, Some(&mut self.rs))?;
            for (ls, lset) in level_sets.iter().enumerate() {
                lset.compute_residual(dom, v, &mut self.rphi[ls]);
            }

            // 守恒量凸组合更新
            spo.primitive_to_conservative(dom, comm, v, id, &mut self.u, false);
            for p in dom.interior.iter() {
                self.u[p] = self.u0[p] * alpha + (self.u[p] + self.r[p] * dt) * (1.0 - alpha);
            }

            // 回到原始量：裁剪 + 双曲性检查 + 外边界
            spo.conservative_to_primitive(dom, comm, &self.u, id, v, false);
            spo.clip_density_and_pressure(dom, comm, v, id, false, true)?;
            spo.apply_boundary_conditions(dom, v);

            // 水平集推进
            for (ls, lset) in level_sets.iter_mut().enumerate() {
                for p in dom.interior.iter() {
                    lset.phi[p] = self.phi0[ls][p] * alpha
                        + (lset.phi[p] + self.rphi[ls][p] * dt) * (1.0 - alpha);
                }
                dom.exchange(comm, &mut lset.phi);
                lset.apply_boundary_conditions(dom, comm);
            }

            // 材料编号重推与换相单元修复
            self.idn.copy_from(id);
            mpo.update_material_id(dom, comm, level_sets, id)?;
            mpo.update_state_variables_after_interface_motion(
                dom, comm, &self.idn, id, v, &self.rs,
            )?;
        }

        Ok(())
    }
}
