// crates/bw_surface/src/lib.rs

//! BlastWave 内嵌边界层
//!
//! 三角化固体表面嵌入流体网格的全部机制：
//! - 表面存储与 ASCII 网格读入 (mesh)
//! - 表面-网格相交器：线段查询、闭包色、窗口 (intersector)
//! - 内嵌边界算子：跟踪、非活动区、受力装配 (embedded)
//! - 运动学标定器接口与注册表 (dynamics)

pub mod dynamics;
pub mod embedded;
pub mod error;
pub mod intersector;
pub mod mesh;

pub use dynamics::{DynamicsRegistry, PrescribedTranslation, SurfaceDynamics};
pub use embedded::EmbeddedBoundaryOperator;
pub use error::SurfaceError;
pub use intersector::Intersector;
pub use mesh::{read_surface_file, TriangulatedSurface};
