// crates/bw_physics/src/lib.rs

//! BlastWave 物理层
//!
//! 可压缩多材料流求解器的数值核心：
//! - 状态向量与状态方程 (state, eos)
//! - 数值格式：限制器、MUSCL 重构、Roe/HLLC/LLF 通量、
//!   精确黎曼求解器 (schemes)
//! - 空间算子：残量装配、边界条件、CFL 时间步 (spatial)
//! - 水平集：输运、重初始化、窄带 (levelset)
//! - 多材料算子：编号推导、换相修复、相变、冲突消解 (multiphase)
//! - 引擎：显式 RK 积分与主循环胶水 (engine)

pub mod engine;
pub mod eos;
pub mod levelset;
pub mod multiphase;
pub mod schemes;
pub mod spatial;
pub mod state;

// 重导出常用类型
pub use engine::{Simulation, StepInfo, TimeIntegrator};
pub use eos::{EquationOfState, MaterialSet, StiffenedGas};
pub use levelset::{FirstLayerNode, LevelSet, LevelSetReinitializer, NarrowBand};
pub use multiphase::{MultiPhaseOperator, PhaseTransitionRule, TemperatureTransition};
pub use schemes::{ExactRiemannSolver, MusclReconstructor, NumericalFlux, RiemannSolutions};
pub use spatial::{Extrema, SpaceOperator};
pub use state::Vec5;
