// crates/bw_physics/src/eos/stiffened_gas.rs

//! 刚性气体状态方程
//!
//! p = (γ-1) ρ (e - q) - γ p∞
//!
//! p∞ = 0 时退化为理想气体。温度取 T = (e - q)/cv，
//! 比焓 h = e + p/ρ，两者用于相变的潜热簿记。

use super::EquationOfState;
use crate::state::Vec5;

/// 刚性气体
#[derive(Debug, Clone)]
pub struct StiffenedGas {
    name: String,
    gamma: f64,
    pstiff: f64,
    cv: f64,
    /// 参考比内能（能量零点）
    q: f64,
    rho_min: f64,
    p_min: f64,
    failsafe_density: f64,
}

impl StiffenedGas {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        gamma: f64,
        pstiff: f64,
        cv: f64,
        q: f64,
        rho_min: f64,
        p_min: f64,
        failsafe_density: f64,
    ) -> Self {
        assert!(gamma > 1.0, "stiffened gas requires gamma > 1");
        assert!(cv > 0.0, "stiffened gas requires cv > 0");
        Self {
            name,
            gamma,
            pstiff,
            cv,
            q,
            rho_min,
            p_min,
            failsafe_density,
        }
    }
}

impl EquationOfState for StiffenedGas {
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn pressure(&self, rho: f64, e: f64) -> f64 {
        (self.gamma - 1.0) * rho * (e - self.q) - self.gamma * self.pstiff
    }

    #[inline]
    fn internal_energy(&self, rho: f64, p: f64) -> f64 {
        self.q + (p + self.gamma * self.pstiff) / ((self.gamma - 1.0) * rho)
    }

    #[inline]
    fn sound_speed_squared(&self, rho: f64, e: f64) -> f64 {
        self.gamma * (self.pressure(rho, e) + self.pstiff) / rho
    }

    #[inline]
    fn temperature(&self, _rho: f64, e: f64) -> f64 {
        (e - self.q) / self.cv
    }

    #[inline]
    fn energy_from_temperature(&self, _rho: f64, t: f64) -> f64 {
        self.q + self.cv * t
    }

    #[inline]
    fn energy_from_enthalpy(&self, rho: f64, h: f64) -> f64 {
        // h = γ e - (γ-1) q - γ p∞/ρ
        (h + (self.gamma - 1.0) * self.q + self.gamma * self.pstiff / rho) / self.gamma
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn pressure_constant(&self) -> f64 {
        self.pstiff
    }

    fn reference_energy(&self) -> f64 {
        self.q
    }

    fn failsafe_density(&self) -> f64 {
        self.failsafe_density
    }

    fn clip_density_and_pressure(&self, v: &mut Vec5) -> bool {
        let mut clipped = false;
        if v[0] < self.rho_min {
            v[0] = self.rho_min;
            clipped = true;
        }
        if v[4] < self.p_min {
            v[4] = self.p_min;
            clipped = true;
        }
        clipped
    }

    fn check_state(&self, v: &Vec5) -> bool {
        if !v.is_finite() || v[0] <= 0.0 {
            return true;
        }
        let e = self.internal_energy(v[0], v[4]);
        self.sound_speed_squared(v[0], e) <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> StiffenedGas {
        // 经典的刚性气体水参数
        StiffenedGas::new("water".into(), 4.4, 6.0e8, 4186.0, 0.0, 1e-12, -1e12, 1.0)
    }

    #[test]
    fn test_pressure_energy_roundtrip() {
        let eos = water();
        let (rho, p) = (1000.0, 1.0e5);
        let e = eos.internal_energy(rho, p);
        assert!((eos.pressure(rho, e) - p).abs() < 1e-6 * p.abs().max(1.0));
    }

    #[test]
    fn test_enthalpy_roundtrip() {
        let eos = water();
        let (rho, p) = (998.0, 2.0e5);
        let e = eos.internal_energy(rho, p);
        let h = e + p / rho;
        assert!((eos.energy_from_enthalpy(rho, h) - e).abs() < 1e-8 * e.abs());
    }

    #[test]
    fn test_temperature_roundtrip() {
        let eos = water();
        let e = eos.energy_from_temperature(1000.0, 300.0);
        assert!((eos.temperature(1000.0, e) - 300.0).abs() < 1e-10);
    }

    #[test]
    fn test_clip_and_check() {
        let eos = StiffenedGas::new("gas".into(), 1.4, 0.0, 1.0, 0.0, 1e-8, 1e-8, 1e-6);
        let mut v = Vec5::new(-1.0, 0.0, 0.0, 0.0, -5.0);
        assert!(eos.clip_density_and_pressure(&mut v));
        assert!(!eos.check_state(&v));

        let bad = Vec5::new(1.0, 0.0, 0.0, 0.0, f64::NAN);
        assert!(eos.check_state(&bad));
    }

    #[test]
    fn test_negative_squared_sound_speed_detected() {
        // 刚性气体在 p < -p∞ 时 c² < 0
        let eos = StiffenedGas::new("w".into(), 4.4, 6.0e8, 4186.0, 0.0, 1e-12, -1e12, 1.0);
        let v = Vec5::new(1000.0, 0.0, 0.0, 0.0, -6.5e8);
        assert!(eos.check_state(&v));
    }
}
