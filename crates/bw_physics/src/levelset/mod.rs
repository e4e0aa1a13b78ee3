// crates/bw_physics/src/levelset/mod.rs

//! 水平集
//!
//! 每个非背景材料持有一个符号距离场 φ（材料内部为负）。本模块
//! 提供：
//! - 窄带簿记 (NarrowBand)
//! - 水平集算子 (LevelSet)：初值、迎风输运残量、边界条件、
//!   重初始化调度
//! - 重初始化器 (reinit)

pub mod reinit;

pub use reinit::{FirstLayerNode, LevelSetReinitializer};

use crate::state::Vec5;
use bw_config::{IcRegionConfig, LevelSetConfig};
use bw_foundation::Int3;
use bw_mesh::{Communicator, Field3, SubDomain};
use glam::DVec3;

/// 窄带簿记
///
/// `level` 为带层号（界面穿越 0，相邻 1，…，带外 i32::MAX）；
/// `useful` 标记带内结点（提供模板支撑），`active` 标记严格带内
/// 结点（被 Hamilton–Jacobi 迭代更新）。紧凑索引表与掩码保持一致。
pub struct NarrowBand {
    pub level: Field3<i32>,
    pub useful: Field3<u8>,
    pub active: Field3<u8>,
    pub useful_nodes: Vec<Int3>,
    pub active_nodes: Vec<Int3>,
}

impl NarrowBand {
    pub fn new(dom: &SubDomain) -> Self {
        Self {
            level: Field3::new(dom.ghosted, i32::MAX),
            useful: Field3::new(dom.ghosted, 0),
            active: Field3::new(dom.ghosted, 0),
            useful_nodes: Vec::new(),
            active_nodes: Vec::new(),
        }
    }
}

/// 单个材料的水平集
pub struct LevelSet {
    pub material_id: usize,
    pub config: LevelSetConfig,
    pub phi: Field3<f64>,
    pub band: NarrowBand,
    pub reinit: LevelSetReinitializer,
    band_built: bool,
}

impl LevelSet {
    pub fn new(dom: &SubDomain, config: LevelSetConfig) -> Self {
        let reinit = LevelSetReinitializer::new(
            dom,
            config.reinit.clone(),
            config.bc,
            config.bandwidth,
        );
        Self {
            material_id: config.material_id,
            phi: Field3::new(dom.ghosted, 0.0),
            band: NarrowBand::new(dom),
            reinit,
            config,
            band_built: false,
        }
    }

    /// 是否窄带模式
    pub fn banded(&self) -> bool {
        self.config.bandwidth > 0
    }

    /// 由几何初值区域构造 φ（区域并的符号距离近似）
    pub fn set_initial_condition(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        regions: &[IcRegionConfig],
    ) {
        let (nx, ny, nz) = dom.global_size();
        let diag = {
            let lo = dom.global.coords(Int3::new(0, 0, 0));
            let hi = dom.global.coords(Int3::new(nx - 1, ny - 1, nz - 1));
            (hi - lo).length().max(1.0)
        };

        for p in dom.ghosted.iter() {
            let x = dom.coords[p];
            let mut phi = diag;
            for region in regions {
                let d = match region {
                    IcRegionConfig::Sphere { center, radius, state } => {
                        if state.material_id != self.material_id {
                            continue;
                        }
                        (x - DVec3::from_array(*center)).length() - radius
                    }
                    IcRegionConfig::Plane { center, normal, state } => {
                        if state.material_id != self.material_id {
                            continue;
                        }
                        // 材料占据法向正侧
                        -(x - DVec3::from_array(*center)).dot(DVec3::from_array(*normal).normalize())
                    }
                };
                phi = phi.min(d);
            }
            self.phi[p] = phi;
        }

        if self.banded() {
            self.reinit
                .construct_narrow_band(dom, comm, &mut self.phi, &mut self.band);
            self.band_built = true;
        }
        self.reinitialize(dom, comm);
    }

    /// 迎风输运残量 R = -(u·∇φ)
    ///
    /// 带模式下只在带内求值，越带邻居按零导数处理（带外 φ 为哨兵）。
    pub fn compute_residual(
        &self,
        dom: &SubDomain,
        v: &Field3<Vec5>,
        rphi: &mut Field3<f64>,
    ) {
        rphi.fill(0.0);
        if self.banded() {
            for &p in &self.band.useful_nodes {
                if dom.is_here(p, false) {
                    rphi[p] = self.advection_at(dom, v, p, true);
                }
            }
        } else {
            for p in dom.interior.iter() {
                rphi[p] = self.advection_at(dom, v, p, false);
            }
        }
    }

    fn advection_at(&self, dom: &SubDomain, v: &Field3<Vec5>, p: Int3, banded: bool) -> f64 {
        let vel = v[p].velocity();
        let c = dom.coords[p];
        let nb = p.axis_neighbors();
        let usable = |q: Int3| !banded || self.band.useful[q] != 0;

        let mut sum = 0.0;
        for d in 0..3 {
            let un = vel[d];
            if un == 0.0 {
                continue;
            }
            let (q, upstream) = if un > 0.0 {
                (nb[2 * d], true)
            } else {
                (nb[2 * d + 1], false)
            };
            if !usable(q) {
                continue;
            }
            let dx = match d {
                0 => (c.x - dom.coords[q].x).abs(),
                1 => (c.y - dom.coords[q].y).abs(),
                _ => (c.z - dom.coords[q].z).abs(),
            };
            let dphi = if upstream {
                (self.phi[p] - self.phi[q]) / dx
            } else {
                (self.phi[q] - self.phi[p]) / dx
            };
            sum += un * dphi;
        }
        -sum
    }

    /// 外边界条件（重初始化器的同一套幽灵填充）
    pub fn apply_boundary_conditions(&mut self, dom: &SubDomain, comm: &dyn Communicator) {
        let band = if self.banded() && self.band_built {
            Some(&self.band)
        } else {
            None
        };
        self.reinit
            .apply_boundary_conditions(dom, comm, &mut self.phi, band);
    }

    /// 重初始化（带模式自动维护窄带）
    pub fn reinitialize(&mut self, dom: &SubDomain, comm: &dyn Communicator) {
        if self.banded() {
            if !self.band_built {
                self.reinit
                    .construct_narrow_band(dom, comm, &mut self.phi, &mut self.band);
                self.band_built = true;
            }
            self.reinit
                .reinitialize_in_band(dom, comm, &mut self.phi, &mut self.band);
        } else {
            self.reinit.reinitialize(dom, comm, &mut self.phi);
        }
    }

    /// 相变之后把新增结点并入带（随后必须重初始化）
    pub fn absorb_new_useful_nodes(&mut self, dom: &SubDomain, nodes: &[Int3]) {
        if !self.banded() || !self.band_built {
            return;
        }
        for &p in nodes {
            if !dom.ghosted.contains(p) {
                continue;
            }
            if self.band.useful[p] == 0 {
                self.band.useful[p] = 1;
                self.band.useful_nodes.push(p);
                self.band.active[p] = 1;
                self.band.active_nodes.push(p);
                self.band.level[p] = 1;
            }
        }
    }
}
