// crates/bw_physics/src/engine/mod.rs

//! 引擎核心
//!
//! - 显式时间积分器 (integrator)：FE / SSP-RK2 / SSP-RK3
//! - 求解器装配与主循环胶水 (driver)

pub mod driver;
pub mod integrator;

pub use driver::{Simulation, StepInfo};
pub use integrator::TimeIntegrator;
