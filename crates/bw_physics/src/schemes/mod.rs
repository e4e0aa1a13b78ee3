// crates/bw_physics/src/schemes/mod.rs

//! 数值格式
//!
//! - 斜率限制器 (limiter)
//! - MUSCL 重构 (reconstruction)
//! - 数值通量 (flux)
//! - 两材料精确黎曼求解器 (exact_riemann)

pub mod exact_riemann;
pub mod flux;
pub mod limiter;
pub mod reconstruction;

pub use exact_riemann::{ExactRiemannSolver, RiemannSolutions};
pub use flux::{max_eigenvalues, numerical_flux, physical_flux, NumericalFlux};
pub use limiter::limited_slope;
pub use reconstruction::MusclReconstructor;
