// crates/bw_foundation/src/lib.rs

//! BlastWave 基础层
//!
//! 提供整个工作空间共享的基础设施：
//! - 基础错误类型 (error)
//! - 网格索引与索引盒 (index)
//! - 三角形 Gauss 积分 (quadrature)
//! - 三线性插值 (interpolation)
//!
//! # 设计原则
//!
//! 本层不依赖项目内任何其他 crate，禁止引入网格、物理、求解器等
//! 高层概念。所有高层错误最终可转换为 [`BwError`]。

pub mod error;
pub mod index;
pub mod interpolation;
pub mod quadrature;

pub use error::{BwError, BwResult};
pub use index::{Axis, Box3, Int3, Side};
pub use interpolation::trilinear;
pub use quadrature::triangle_gauss_rule;
