// crates/bw_config/src/lib.rs

//! BlastWave 配置层
//!
//! 求解器的全部输入数据：网格、边界条件、材料、水平集、多材料
//! 选项、内嵌表面、数值格式、时间推进与输出。配置错误一律致命，
//! 并携带出错的配置键。

pub mod error;
pub mod solver_config;

pub use error::ConfigError;
pub use solver_config::{
    BoundaryCondKind, BoundaryStateConfig, ClosureBinding, EmbeddedConfig, EosConfig,
    ExactRiemannConfig, FirstLayerTreatment, FluxKind, IcRegionConfig, IntegratorKind,
    LevelSetBc, LevelSetConfig, LimiterKind, MaterialConfig, MeshConfig, MultiPhaseConfig,
    OutputConfig, PartitionConfig, PhaseChangeKind, ReinitConfig, SchemeConfig, SolverConfig,
    StateConfig, SurfaceConfig, TimeConfig, TransitionConfig,
};
