// crates/bw_physics/src/eos/mod.rs

//! 状态方程
//!
//! 每个材料绑定一个 [`EquationOfState`] 实现，承担：
//! - 原始 ↔ 守恒变量转换
//! - 密度/压力裁剪与双曲性检查
//! - 声速、温度、焓的互算（相变簿记用）
//!
//! 精确黎曼求解器通过 `gamma()` / `pressure_constant()` 获取
//! 刚性气体族的两个参数。

mod stiffened_gas;

pub use stiffened_gas::StiffenedGas;

use crate::state::Vec5;
use bw_config::{EosConfig, MaterialConfig};

/// 状态方程接口
pub trait EquationOfState: Send + Sync {
    fn name(&self) -> &str;

    /// p = p(ρ, e)
    fn pressure(&self, rho: f64, e: f64) -> f64;

    /// e = e(ρ, p)
    fn internal_energy(&self, rho: f64, p: f64) -> f64;

    /// c² = c²(ρ, e)；可为负（双曲性破坏，由调用方检查）
    fn sound_speed_squared(&self, rho: f64, e: f64) -> f64;

    /// T = T(ρ, e)
    fn temperature(&self, rho: f64, e: f64) -> f64;

    /// e = e(ρ, T)
    fn energy_from_temperature(&self, rho: f64, t: f64) -> f64;

    /// e = e(ρ, h)，h 为比焓
    fn energy_from_enthalpy(&self, rho: f64, h: f64) -> f64;

    /// 绝热指数 γ
    fn gamma(&self) -> f64;

    /// 刚性常数 p∞（理想气体为 0）
    fn pressure_constant(&self) -> f64;

    /// 参考比内能（能量零点），Roe 平均的能量通道需要
    fn reference_energy(&self) -> f64;

    /// 相变修复兜底密度
    fn failsafe_density(&self) -> f64;

    /// 把原始状态裁剪到正密度/压力下限；返回是否发生了裁剪
    fn clip_density_and_pressure(&self, v: &mut Vec5) -> bool;

    /// 状态是否破坏双曲性（c² ≤ 0 或 ρ ≤ 0）
    fn check_state(&self, v: &Vec5) -> bool;

    /// 守恒 → 原始
    fn conservative_to_primitive(&self, u: &Vec5) -> Vec5 {
        let rho = u[0];
        let vel = u.velocity() / rho;
        let e = u[4] / rho - 0.5 * vel.length_squared();
        let mut v = Vec5::new(rho, vel.x, vel.y, vel.z, self.pressure(rho, e));
        v.set_velocity(vel);
        v
    }

    /// 原始 → 守恒
    fn primitive_to_conservative(&self, v: &Vec5) -> Vec5 {
        let rho = v.rho();
        let vel = v.velocity();
        let e = self.internal_energy(rho, v.pressure());
        Vec5::new(
            rho,
            rho * vel.x,
            rho * vel.y,
            rho * vel.z,
            rho * (e + 0.5 * vel.length_squared()),
        )
    }

    /// 声速（ρ, p 形式）
    fn sound_speed(&self, rho: f64, p: f64) -> f64 {
        self.sound_speed_squared(rho, self.internal_energy(rho, p)).max(0.0).sqrt()
    }
}

/// 按材料编号索引的状态方程集合
pub struct MaterialSet {
    models: Vec<Box<dyn EquationOfState>>,
}

impl MaterialSet {
    pub fn from_config(materials: &[MaterialConfig]) -> Self {
        let models = materials
            .iter()
            .map(|m| {
                let EosConfig::StiffenedGas { gamma, pressure_constant, cv, e_ref } = m.eos.clone();
                Box::new(StiffenedGas::new(
                    m.name.clone(),
                    gamma,
                    pressure_constant,
                    cv,
                    e_ref,
                    m.rho_min,
                    m.p_min,
                    m.failsafe_density,
                )) as Box<dyn EquationOfState>
            })
            .collect();
        Self { models }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[inline]
    pub fn get(&self, id: usize) -> &dyn EquationOfState {
        self.models[id].as_ref()
    }
}
