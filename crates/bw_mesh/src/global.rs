// crates/bw_mesh/src/global.rs

//! 全局网格几何
//!
//! 保存整个矩形域的单元中心坐标与间距数组，并提供点定位查询。
//! 所有查询对幽灵层外推：索引越界时按边界间距线性延拓。

use bw_foundation::{BwError, BwResult, Int3};
use glam::DVec3;

/// 全局直线网格
///
/// `x/y/z` 为单元中心坐标，`dx/dy/dz` 为对应间距。
#[derive(Debug, Clone)]
pub struct GlobalMesh {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
    pub dz: Vec<f64>,
}

impl GlobalMesh {
    /// 均匀矩形域
    pub fn uniform(
        x0: f64,
        xmax: f64,
        y0: f64,
        ymax: f64,
        z0: f64,
        zmax: f64,
        nx: usize,
        ny: usize,
        nz: usize,
    ) -> BwResult<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(BwError::invalid_input("Mesh must have at least one cell per axis"));
        }
        if xmax <= x0 || ymax <= y0 || zmax <= z0 {
            return Err(BwError::invalid_input("Mesh bounds are degenerate"));
        }
        let build = |lo: f64, hi: f64, n: usize| {
            let d = (hi - lo) / n as f64;
            let centers: Vec<f64> = (0..n).map(|i| lo + (i as f64 + 0.5) * d).collect();
            (centers, vec![d; n])
        };
        let (x, dx) = build(x0, xmax, nx);
        let (y, dy) = build(y0, ymax, ny);
        let (z, dz) = build(z0, zmax, nz);
        Ok(Self { x, y, z, dx, dy, dz })
    }

    /// 全局单元数 (NX, NY, NZ)
    pub fn size(&self) -> (i32, i32, i32) {
        (self.x.len() as i32, self.y.len() as i32, self.z.len() as i32)
    }

    /// 单元中心 x 坐标（越界时外推）
    pub fn get_x(&self, i: i32) -> f64 {
        coord_at(&self.x, &self.dx, i)
    }

    pub fn get_y(&self, j: i32) -> f64 {
        coord_at(&self.y, &self.dy, j)
    }

    pub fn get_z(&self, k: i32) -> f64 {
        coord_at(&self.z, &self.dz, k)
    }

    pub fn get_dx(&self, i: i32) -> f64 {
        spacing_at(&self.dx, i)
    }

    pub fn get_dy(&self, j: i32) -> f64 {
        spacing_at(&self.dy, j)
    }

    pub fn get_dz(&self, k: i32) -> f64 {
        spacing_at(&self.dz, k)
    }

    /// 单元中心坐标
    pub fn coords(&self, p: Int3) -> DVec3 {
        DVec3::new(self.get_x(p.i), self.get_y(p.j), self.get_z(p.k))
    }

    /// 单元间距
    pub fn dxyz(&self, p: Int3) -> DVec3 {
        DVec3::new(self.get_dx(p.i), self.get_dy(p.j), self.get_dz(p.k))
    }

    /// 点是否落在（可含一层幽灵的）物理域内
    pub fn is_point_in_domain(&self, p: DVec3, include_ghost_layer: bool) -> bool {
        let shift = if include_ghost_layer { 1.5 } else { 0.5 };
        let nx = self.x.len();
        let ny = self.y.len();
        let nz = self.z.len();
        p.x >= self.x[0] - shift * self.dx[0]
            && p.x <= self.x[nx - 1] + shift * self.dx[nx - 1]
            && p.y >= self.y[0] - shift * self.dy[0]
            && p.y <= self.y[ny - 1] + shift * self.dy[ny - 1]
            && p.z >= self.z[0] - shift * self.dz[0]
            && p.z <= self.z[nz - 1] + shift * self.dz[nz - 1]
    }

    /// 点是否落在结点网格（单元中心连成的网格）内
    pub fn is_point_in_nodal_mesh(&self, p: DVec3, include_ghost_layer: bool) -> bool {
        let shift = if include_ghost_layer { 1.0 } else { 0.0 };
        let nx = self.x.len();
        let ny = self.y.len();
        let nz = self.z.len();
        p.x >= self.x[0] - shift * self.dx[0]
            && p.x <= self.x[nx - 1] + shift * self.dx[nx - 1]
            && p.y >= self.y[0] - shift * self.dy[0]
            && p.y <= self.y[ny - 1] + shift * self.dy[ny - 1]
            && p.z >= self.z[0] - shift * self.dz[0]
            && p.z <= self.z[nz - 1] + shift * self.dz[nz - 1]
    }

    /// 找到覆盖点 p 的单元
    ///
    /// 单元 i 的控制体为 `[x_i - dx/2, x_i + dx/2)`。`include_ghost_layer`
    /// 允许结果落在一层幽灵内（索引 -1 或 N）。
    pub fn find_cell_covering_point(&self, p: DVec3, include_ghost_layer: bool) -> Option<Int3> {
        if !self.is_point_in_domain(p, include_ghost_layer) {
            return None;
        }
        Some(Int3::new(
            covering_index(&self.x, &self.dx, p.x, include_ghost_layer),
            covering_index(&self.y, &self.dy, p.y, include_ghost_layer),
            covering_index(&self.z, &self.dz, p.z, include_ghost_layer),
        ))
    }

    /// 找到覆盖点 p 的插值元（八个单元中心构成的六面体）
    ///
    /// 返回元的低角索引与局部坐标 ξ ∈ [0,1]³。
    pub fn find_element_covering_point(
        &self,
        p: DVec3,
        include_ghost_layer: bool,
    ) -> Option<(Int3, DVec3)> {
        if !self.is_point_in_nodal_mesh(p, include_ghost_layer) {
            return None;
        }
        let i0 = upper_bound(&self.x, p.x) as i32 - 1;
        let j0 = upper_bound(&self.y, p.y) as i32 - 1;
        let k0 = upper_bound(&self.z, p.z) as i32 - 1;
        let ijk0 = Int3::new(i0, j0, k0);

        let sx = self.get_x(i0);
        let sy = self.get_y(j0);
        let sz = self.get_z(k0);
        let xi = DVec3::new(
            (p.x - sx) / (self.get_x(i0 + 1) - sx),
            (p.y - sy) / (self.get_y(j0 + 1) - sy),
            (p.z - sz) / (self.get_z(k0 + 1) - sz),
        );
        Some((ijk0, xi))
    }

    /// 最近结点（单元中心）
    pub fn find_closest_node(&self, p: DVec3, include_ghost_layer: bool) -> Int3 {
        Int3::new(
            closest_index(&self.x, &self.dx, p.x, include_ghost_layer),
            closest_index(&self.y, &self.dy, p.y, include_ghost_layer),
            closest_index(&self.z, &self.dz, p.z, include_ghost_layer),
        )
    }
}

fn coord_at(c: &[f64], d: &[f64], i: i32) -> f64 {
    let n = c.len() as i32;
    if i < 0 {
        c[0] + i as f64 * d[0]
    } else if i >= n {
        c[n as usize - 1] + (i - n + 1) as f64 * d[n as usize - 1]
    } else {
        c[i as usize]
    }
}

fn spacing_at(d: &[f64], i: i32) -> f64 {
    let n = d.len() as i32;
    if i < 0 {
        d[0]
    } else if i >= n {
        d[n as usize - 1]
    } else {
        d[i as usize]
    }
}

/// 第一个大于 v 的元素下标
fn upper_bound(c: &[f64], v: f64) -> usize {
    c.partition_point(|&x| x <= v)
}

fn covering_index(c: &[f64], d: &[f64], v: f64, include_ghost: bool) -> i32 {
    let n = c.len();
    if include_ghost && v < c[0] - 0.5 * d[0] {
        return -1;
    }
    for (i, (&ci, &di)) in c.iter().zip(d.iter()).enumerate() {
        if v < ci + 0.5 * di {
            return i as i32;
        }
    }
    if include_ghost {
        n as i32
    } else {
        n as i32 - 1
    }
}

fn closest_index(c: &[f64], d: &[f64], v: f64, include_ghost: bool) -> i32 {
    let n = c.len();
    let i = upper_bound(c, v);
    let d1 = if i == n {
        (c[n - 1] + d[n - 1] - v).abs()
    } else {
        (c[i] - v).abs()
    };
    let d2 = if i == 0 {
        (c[0] - d[0] - v).abs()
    } else {
        (c[i - 1] - v).abs()
    };
    let mut idx = if d1 < d2 { i as i32 } else { i as i32 - 1 };
    if !include_ghost {
        idx = idx.clamp(0, n as i32 - 1);
    }
    idx
}
