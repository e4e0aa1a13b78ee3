// crates/bw_mesh/src/ghost.rs

//! 物理域外幽灵结点
//!
//! 子域幽灵盒中落在物理域之外的结点按投影类型分类：
//! - Face: 恰好一个轴越界，边界条件会填充它
//! - Edge / Vertex: 两个或三个轴越界，不被填充（消费方须跳过）
//!
//! `image` 是它关于边界面镜像的域内结点。

use bw_foundation::{Box3, Int3, Side};

/// 投影类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostProjection {
    Face,
    Edge,
    Vertex,
}

/// 物理域外的幽灵结点
#[derive(Debug, Clone, Copy)]
pub struct GhostNode {
    /// 幽灵结点索引
    pub ijk: Int3,
    /// 镜像（域内）结点索引
    pub image: Int3,
    /// 所在物理边界面（Face 投影才有意义；Edge/Vertex 取第一个越界轴）
    pub side: Side,
    /// 投影类型
    pub proj: GhostProjection,
}

/// 枚举幽灵盒内所有物理域外结点
pub fn enumerate_outer_ghosts(ghosted: Box3, global_size: (i32, i32, i32)) -> Vec<GhostNode> {
    let (nx, ny, nz) = global_size;
    let mut out = Vec::new();

    for p in ghosted.iter() {
        let out_x = p.i < 0 || p.i >= nx;
        let out_y = p.j < 0 || p.j >= ny;
        let out_z = p.k < 0 || p.k >= nz;
        let n_out = usize::from(out_x) + usize::from(out_y) + usize::from(out_z);
        if n_out == 0 {
            continue;
        }

        let image = Int3::new(p.i.clamp(0, nx - 1), p.j.clamp(0, ny - 1), p.k.clamp(0, nz - 1));
        let side = if out_x {
            if p.i < 0 { Side::XMin } else { Side::XMax }
        } else if out_y {
            if p.j < 0 { Side::YMin } else { Side::YMax }
        } else if p.k < 0 {
            Side::ZMin
        } else {
            Side::ZMax
        };
        let proj = match n_out {
            1 => GhostProjection::Face,
            2 => GhostProjection::Edge,
            _ => GhostProjection::Vertex,
        };
        out.push(GhostNode { ijk: p, image, side, proj });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_on_full_domain() {
        // 4x4x4 网格整域，一层幽灵
        let ghosted = Box3::new(Int3::new(-1, -1, -1), Int3::new(5, 5, 5));
        let ghosts = enumerate_outer_ghosts(ghosted, (4, 4, 4));
        let faces = ghosts.iter().filter(|g| g.proj == GhostProjection::Face).count();
        let edges = ghosts.iter().filter(|g| g.proj == GhostProjection::Edge).count();
        let verts = ghosts.iter().filter(|g| g.proj == GhostProjection::Vertex).count();
        assert_eq!(faces, 6 * 16);
        assert_eq!(edges, 12 * 4);
        assert_eq!(verts, 8);
        assert_eq!(ghosts.len(), 6 * 6 * 6 - 4 * 4 * 4);
    }

    #[test]
    fn test_image_and_side() {
        let ghosted = Box3::new(Int3::new(-1, 0, 0), Int3::new(3, 2, 2));
        let ghosts = enumerate_outer_ghosts(ghosted, (8, 2, 2));
        for g in &ghosts {
            assert_eq!(g.ijk.i, -1);
            assert_eq!(g.image, Int3::new(0, g.ijk.j, g.ijk.k));
            assert_eq!(g.side, Side::XMin);
            assert_eq!(g.proj, GhostProjection::Face);
        }
    }

    #[test]
    fn test_interior_subdomain_has_no_outer_ghosts() {
        // 不贴物理边界的子域
        let ghosted = Box3::new(Int3::new(1, 1, 1), Int3::new(4, 4, 4));
        assert!(enumerate_outer_ghosts(ghosted, (8, 8, 8)).is_empty());
    }
}
