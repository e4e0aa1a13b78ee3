// crates/bw_mesh/src/domain.rs

//! 子域
//!
//! 一个 rank 拥有的那块网格：内部盒、幽灵盒、几何张量（坐标、间距、
//! 体积）、域外幽灵结点表与邻居拓扑。所有算子都以子域 + 通信子的
//! 组合工作。

use crate::comm::Communicator;
use crate::decomposition::CartDecomp;
use crate::field::{Field3, HaloPack};
use crate::ghost::{enumerate_outer_ghosts, GhostNode};
use crate::global::GlobalMesh;
use crate::halo::exchange_halo;
use bw_foundation::{Box3, Int3, Side};
use glam::DVec3;
use std::sync::Arc;

/// 一个 rank 的子域
pub struct SubDomain {
    pub global: Arc<GlobalMesh>,
    pub decomp: CartDecomp,
    pub rank: usize,
    /// 内部盒 `[i0..imax) × [j0..jmax) × [k0..kmax)`
    pub interior: Box3,
    /// 幽灵盒 `[ii0..iimax) × …`（内部盒外扩一层）
    pub ghosted: Box3,
    /// 各面方向的邻居 rank
    pub neighbors: [Option<usize>; 6],
    /// 单元中心坐标（含幽灵，域外按间距延拓）
    pub coords: Field3<DVec3>,
    /// 单元间距
    pub dxyz: Field3<DVec3>,
    /// 单元体积
    pub volume: Field3<f64>,
    /// 物理域外幽灵结点
    pub ghost_outer: Vec<GhostNode>,
    /// 物理域内、归邻居 rank 所有的幽灵结点
    pub ghost_inner: Vec<Int3>,
}

impl SubDomain {
    pub fn new(global: Arc<GlobalMesh>, decomp: CartDecomp, rank: usize) -> Self {
        let interior = decomp.interior_box(rank);
        let ghosted = interior.grown(1);
        let neighbors = decomp.neighbors(rank);
        let (nx, ny, nz) = global.size();

        let mut coords = Field3::new(ghosted, DVec3::ZERO);
        let mut dxyz = Field3::new(ghosted, DVec3::ZERO);
        let mut volume = Field3::new(ghosted, 0.0);
        for p in ghosted.iter() {
            let d = global.dxyz(p);
            coords[p] = global.coords(p);
            dxyz[p] = d;
            volume[p] = d.x * d.y * d.z;
        }

        let ghost_outer = enumerate_outer_ghosts(ghosted, (nx, ny, nz));
        let mut ghost_inner = Vec::new();
        for p in ghosted.iter() {
            if interior.contains(p) {
                continue;
            }
            let inside = p.i >= 0 && p.i < nx && p.j >= 0 && p.j < ny && p.k >= 0 && p.k < nz;
            if inside {
                ghost_inner.push(p);
            }
        }

        Self {
            global,
            decomp,
            rank,
            interior,
            ghosted,
            neighbors,
            coords,
            dxyz,
            volume,
            ghost_outer,
            ghost_inner,
        }
    }

    /// 单 rank 子域（覆盖整个物理域）
    pub fn solo(global: Arc<GlobalMesh>) -> Self {
        let (nx, ny, nz) = global.size();
        let decomp = CartDecomp::new(1, 1, 1, nx as usize, ny as usize, nz as usize)
            .expect("solo decomposition of a validated mesh cannot fail");
        Self::new(global, decomp, 0)
    }

    /// 全局单元数 (NX, NY, NZ)
    pub fn global_size(&self) -> (i32, i32, i32) {
        self.global.size()
    }

    /// 结点是否属于本子域（可选把幽灵层算进去）
    pub fn is_here(&self, p: Int3, include_ghost: bool) -> bool {
        if include_ghost {
            self.ghosted.contains(p)
        } else {
            self.interior.contains(p)
        }
    }

    /// 结点是否在物理域之外
    pub fn outside_physical_domain(&self, p: Int3) -> bool {
        let (nx, ny, nz) = self.global.size();
        p.i < 0 || p.i >= nx || p.j < 0 || p.j >= ny || p.k < 0 || p.k >= nz
    }

    /// 域外且未被填充（两个及以上的轴越界：棱/角幽灵）
    pub fn outside_physical_domain_and_unpopulated(&self, p: Int3) -> bool {
        let (nx, ny, nz) = self.global.size();
        let n_out = usize::from(p.i < 0 || p.i >= nx)
            + usize::from(p.j < 0 || p.j >= ny)
            + usize::from(p.k < 0 || p.k >= nz);
        n_out >= 2
    }

    /// 该 rank 是否贴着某个物理边界面
    pub fn touches_side(&self, side: Side) -> bool {
        let (nx, ny, nz) = self.global.size();
        match side {
            Side::XMin => self.interior.lo.i == 0,
            Side::XMax => self.interior.hi.i == nx,
            Side::YMin => self.interior.lo.j == 0,
            Side::YMax => self.interior.hi.j == ny,
            Side::ZMin => self.interior.lo.k == 0,
            Side::ZMax => self.interior.hi.k == nz,
        }
    }

    /// 单元处最小间距 min(dx,dy,dz)
    #[inline]
    pub fn min_spacing(&self, p: Int3) -> f64 {
        let d = self.dxyz[p];
        d.x.min(d.y).min(d.z)
    }

    /// 幽灵交换（写入可能被邻居读取的场之后必须调用）
    pub fn exchange<T: HaloPack>(&self, comm: &dyn Communicator, field: &mut Field3<T>) {
        exchange_halo(comm, self.interior, self.neighbors, field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solo_domain(n: usize) -> SubDomain {
        let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, n, n, n).unwrap();
        SubDomain::solo(Arc::new(gm))
    }

    #[test]
    fn test_solo_boxes() {
        let d = solo_domain(4);
        assert_eq!(d.interior, Box3::new(Int3::new(0, 0, 0), Int3::new(4, 4, 4)));
        assert_eq!(d.ghosted, Box3::new(Int3::new(-1, -1, -1), Int3::new(5, 5, 5)));
        assert!(d.ghost_inner.is_empty());
        assert!(!d.ghost_outer.is_empty());
    }

    #[test]
    fn test_outside_physical_domain() {
        let d = solo_domain(4);
        assert!(d.outside_physical_domain(Int3::new(-1, 0, 0)));
        assert!(!d.outside_physical_domain(Int3::new(3, 3, 3)));
        assert!(!d.outside_physical_domain_and_unpopulated(Int3::new(-1, 0, 0)));
        assert!(d.outside_physical_domain_and_unpopulated(Int3::new(-1, -1, 0)));
    }

    #[test]
    fn test_ghost_coords_extrapolated() {
        let d = solo_domain(4);
        let c = d.coords[Int3::new(-1, 0, 0)];
        assert!((c.x + 0.125).abs() < 1e-14);
        assert!((d.volume[Int3::new(-1, 0, 0)] - 0.25f64.powi(3)).abs() < 1e-14);
    }

    #[test]
    fn test_split_domain_inner_ghosts() {
        let gm = Arc::new(GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 8, 4, 4).unwrap());
        let decomp = CartDecomp::new(2, 1, 1, 8, 4, 4).unwrap();
        let d0 = SubDomain::new(Arc::clone(&gm), decomp, 0);
        // rank0 的 +x 幽灵面在物理域内，归 rank1 所有
        assert!(d0.ghost_inner.iter().all(|p| p.i == 4));
        assert_eq!(d0.ghost_inner.len(), 16);
        assert_eq!(d0.neighbors[1], Some(1));
        assert!(d0.touches_side(Side::XMin));
        assert!(!d0.touches_side(Side::XMax));
    }
}
