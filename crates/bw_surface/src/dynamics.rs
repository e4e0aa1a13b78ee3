// crates/bw_surface/src/dynamics.rs

//! 表面运动学标定器
//!
//! 窄能力接口 {create, destroy, evaluate}：这里以 trait 对象 +
//! 注册表的静态链接方式提供。`evaluate` 写出每个结点的位移与
//! 速度；算子随后令 X = X0 + disp。

use crate::error::SurfaceError;
use glam::DVec3;
use std::collections::BTreeMap;

/// 表面运动学接口
pub trait SurfaceDynamics: Send + Sync {
    /// 在时刻 t 写出位移 `disp` 与速度 `udot`（长度 = 结点数）
    fn evaluate(&mut self, t: f64, x0: &[DVec3], x: &[DVec3], disp: &mut [DVec3], udot: &mut [DVec3]);
}

/// 匀速平移（内置样例）
pub struct PrescribedTranslation {
    pub velocity: DVec3,
}

impl SurfaceDynamics for PrescribedTranslation {
    fn evaluate(
        &mut self,
        t: f64,
        x0: &[DVec3],
        _x: &[DVec3],
        disp: &mut [DVec3],
        udot: &mut [DVec3],
    ) {
        debug_assert_eq!(x0.len(), disp.len());
        for (d, u) in disp.iter_mut().zip(udot.iter_mut()) {
            *d = self.velocity * t;
            *u = self.velocity;
        }
    }
}

type Factory = Box<dyn Fn() -> Box<dyn SurfaceDynamics> + Send + Sync>;

/// 运动学标定器注册表
///
/// 配置里的 `dynamics` 名字在这里解析。
#[derive(Default)]
pub struct DynamicsRegistry {
    factories: BTreeMap<String, Factory>,
}

impl DynamicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带内置标定器的注册表
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("unit_translation_x", || {
            Box::new(PrescribedTranslation { velocity: DVec3::X })
        });
        reg
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn SurfaceDynamics> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn SurfaceDynamics>, SurfaceError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| SurfaceError::UnknownDynamics { name: name.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let reg = DynamicsRegistry::with_builtins();
        assert!(reg.create("unit_translation_x").is_ok());
        assert!(matches!(
            reg.create("no_such_thing"),
            Err(SurfaceError::UnknownDynamics { .. })
        ));
    }

    #[test]
    fn test_prescribed_translation() {
        let mut dynamics = PrescribedTranslation { velocity: DVec3::new(2.0, 0.0, 0.0) };
        let x0 = vec![DVec3::ZERO, DVec3::Y];
        let x = x0.clone();
        let mut disp = vec![DVec3::ZERO; 2];
        let mut udot = vec![DVec3::ZERO; 2];
        dynamics.evaluate(0.5, &x0, &x, &mut disp, &mut udot);
        assert_eq!(disp[0], DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(udot[1], DVec3::new(2.0, 0.0, 0.0));
    }
}
