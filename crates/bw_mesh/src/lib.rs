// crates/bw_mesh/src/lib.rs

//! BlastWave 网格层
//!
//! 提供结构化笛卡尔网格的分布式基础设施：
//! - 全局网格几何查询 (global)
//! - 带幽灵层的三维张量场 (field)
//! - 笛卡尔区域分解 (decomposition)
//! - 通信子抽象：单 rank 与进程内多 rank (comm)
//! - 幽灵层交换 (halo)
//! - 物理域外幽灵结点枚举 (ghost)
//! - 子域几何与掩码 (domain)
//!
//! # 并发模型
//!
//! SPMD：每个 rank 一个线程，rank 内不做并行。所有跨 rank 操作
//! 都经过 [`Communicator`]（规约、屏障）或显式幽灵交换。

pub mod comm;
pub mod decomposition;
pub mod domain;
pub mod field;
pub mod ghost;
pub mod global;
pub mod halo;

pub use comm::{Communicator, ReduceOp, SoloComm, ThreadComm};
pub use decomposition::CartDecomp;
pub use domain::SubDomain;
pub use field::{Field3, HaloPack};
pub use ghost::{GhostNode, GhostProjection};
pub use global::GlobalMesh;
pub use halo::exchange_halo;
