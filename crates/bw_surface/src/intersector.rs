// crates/bw_surface/src/intersector.rs

//! 表面-网格相交器
//!
//! 每个内嵌表面一个实例，提供：
//! - 线段相交查询（带半厚度容差）
//! - 闭包色：被表面分隔的连通区域标号（-1, -2, …）
//! - 每个三角形的区域边界分类（某侧面向给定颜色的区域）
//! - 本子域窗口内的三角形集合
//!
//! 候选三角形按全局单元分桶加速；区域标号在全局网格上用中心
//! 连线阻断判据做 6 连通泛洪，所有 rank 结果一致，无需通信。

use crate::mesh::TriangulatedSurface;
use bw_foundation::Int3;
use bw_mesh::{GlobalMesh, SubDomain};
use glam::DVec3;
use std::collections::{HashMap, VecDeque};

/// 表面-网格相交器
pub struct Intersector {
    half_thickness: f64,
    /// 全局单元 → 候选三角形
    bins: HashMap<Int3, Vec<usize>>,
    /// 全局单元的闭包色（-1, -2, …）
    colors: Vec<i32>,
    n_regions: usize,
    /// 本子域窗口内的三角形
    scope: Vec<usize>,
}

impl Intersector {
    pub fn new(half_thickness: f64) -> Self {
        Self {
            half_thickness,
            bins: HashMap::new(),
            colors: Vec::new(),
            n_regions: 0,
            scope: Vec::new(),
        }
    }

    pub fn half_thickness(&self) -> f64 {
        self.half_thickness
    }

    pub fn n_regions(&self) -> usize {
        self.n_regions
    }

    /// 全跟踪：重建分桶、闭包色与子域窗口
    pub fn track_surface_full_course(
        &mut self,
        surface: &TriangulatedSurface,
        global: &GlobalMesh,
        dom: &SubDomain,
    ) {
        self.build_bins(surface, global);
        self.build_scope(surface, global, dom);
        self.flood_fill_colors(surface, global);
    }

    /// 表面移动后的重跟踪；返回相对 `prev_x` 的最大结点位移
    pub fn recompute_full_course(
        &mut self,
        surface: &TriangulatedSurface,
        global: &GlobalMesh,
        dom: &SubDomain,
        prev_x: &[DVec3],
    ) -> f64 {
        self.track_surface_full_course(surface, global, dom);
        surface.max_displacement(prev_x)
    }

    /// 本子域窗口内的三角形
    pub fn elements_in_scope(&self) -> &[usize] {
        &self.scope
    }

    /// 全局单元的闭包色
    pub fn color_at(&self, global: &GlobalMesh, cell: Int3) -> Option<i32> {
        let (nx, ny, nz) = global.size();
        if cell.i < 0 || cell.i >= nx || cell.j < 0 || cell.j >= ny || cell.k < 0 || cell.k >= nz {
            return None;
        }
        Some(self.colors[((cell.k * ny + cell.j) * nx + cell.i) as usize])
    }

    /// 线段 (a,b) 是否与表面相交（含半厚度容差）
    pub fn intersects(&self, surface: &TriangulatedSurface, global: &GlobalMesh, a: DVec3, b: DVec3) -> bool {
        let eps = self.half_thickness;
        let lo = a.min(b) - DVec3::splat(eps);
        let hi = a.max(b) + DVec3::splat(eps);

        let Some(clo) = global.find_cell_covering_point(lo, true) else {
            return self.intersects_brute(surface, a, b);
        };
        let Some(chi) = global.find_cell_covering_point(hi, true) else {
            return self.intersects_brute(surface, a, b);
        };

        let mut checked: Vec<usize> = Vec::new();
        for k in clo.k..=chi.k {
            for j in clo.j..=chi.j {
                for i in clo.i..=chi.i {
                    let Some(cands) = self.bins.get(&Int3::new(i, j, k)) else {
                        continue;
                    };
                    for &t in cands {
                        if checked.contains(&t) {
                            continue;
                        }
                        checked.push(t);
                        if segment_hits_triangle(a, b, surface.triangle(t), eps) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn intersects_brute(&self, surface: &TriangulatedSurface, a: DVec3, b: DVec3) -> bool {
        (0..surface.elems.len())
            .any(|t| segment_hits_triangle(a, b, surface.triangle(t), self.half_thickness))
    }

    /// 每个三角形相对给定（非活动）颜色的边界分类
    ///
    /// 输出值：1 = 正法向一侧面向该颜色区域；2 = 负侧；3 = 两侧。
    pub fn find_color_boundary(
        &self,
        surface: &TriangulatedSurface,
        global: &GlobalMesh,
        color: i32,
        status: &mut Vec<i32>,
    ) {
        status.clear();
        status.resize(surface.elems.len(), 0);

        for &t in &self.scope {
            let tri = surface.triangle(t);
            let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
            let n = surface.elem_norm[t];

            let probe = |sign: f64| -> Option<i32> {
                // 沿法向采样一格；落在表面过近的单元时再退一格
                for steps in 1..=2 {
                    let cell = global.find_cell_covering_point(centroid, false)?;
                    let h = global
                        .dxyz(cell)
                        .min_element()
                        * steps as f64;
                    let q = centroid + sign * h * n;
                    if let Some(c) = global.find_cell_covering_point(q, false) {
                        return self.color_at(global, c);
                    }
                }
                None
            };

            let pos = probe(1.0);
            let neg = probe(-1.0);
            let mut s = 0;
            if pos == Some(color) {
                s |= 1;
            }
            if neg == Some(color) {
                s |= 2;
            }
            status[t] = s;
        }
    }

    // ============================================================
    // 构建
    // ============================================================

    fn build_bins(&mut self, surface: &TriangulatedSurface, global: &GlobalMesh) {
        self.bins.clear();
        let eps = self.half_thickness;
        for t in 0..surface.elems.len() {
            let tri = surface.triangle(t);
            let lo = tri[0].min(tri[1]).min(tri[2]) - DVec3::splat(eps);
            let hi = tri[0].max(tri[1]).max(tri[2]) + DVec3::splat(eps);
            let Some(clo) = global.find_cell_covering_point(lo, true) else {
                continue;
            };
            let Some(chi) = global.find_cell_covering_point(hi, true) else {
                continue;
            };
            for k in clo.k..=chi.k {
                for j in clo.j..=chi.j {
                    for i in clo.i..=chi.i {
                        self.bins.entry(Int3::new(i, j, k)).or_default().push(t);
                    }
                }
            }
        }
    }

    fn build_scope(&mut self, surface: &TriangulatedSurface, global: &GlobalMesh, dom: &SubDomain) {
        self.scope.clear();
        // 子域幽灵盒再放宽两格，保证抬升后的 Gauss 点仍被覆盖
        let win = dom.ghosted.grown(2);
        let wlo = DVec3::new(
            global.get_x(win.lo.i),
            global.get_y(win.lo.j),
            global.get_z(win.lo.k),
        );
        let whi = DVec3::new(
            global.get_x(win.hi.i - 1),
            global.get_y(win.hi.j - 1),
            global.get_z(win.hi.k - 1),
        );
        for t in 0..surface.elems.len() {
            let tri = surface.triangle(t);
            let lo = tri[0].min(tri[1]).min(tri[2]);
            let hi = tri[0].max(tri[1]).max(tri[2]);
            let disjoint = hi.x < wlo.x
                || lo.x > whi.x
                || hi.y < wlo.y
                || lo.y > whi.y
                || hi.z < wlo.z
                || lo.z > whi.z;
            if !disjoint {
                self.scope.push(t);
            }
        }
    }

    /// 闭包色泛洪：中心连线被表面阻断的相邻单元不连通
    fn flood_fill_colors(&mut self, surface: &TriangulatedSurface, global: &GlobalMesh) {
        let (nx, ny, nz) = global.size();
        let total = (nx * ny * nz) as usize;
        self.colors = vec![0; total];
        let lin = |p: Int3| ((p.k * ny + p.j) * nx + p.i) as usize;

        let mut next_color = -1i32;
        for seed_k in 0..nz {
            for seed_j in 0..ny {
                for seed_i in 0..nx {
                    let seed = Int3::new(seed_i, seed_j, seed_k);
                    if self.colors[lin(seed)] != 0 {
                        continue;
                    }
                    let color = next_color;
                    next_color -= 1;
                    self.colors[lin(seed)] = color;
                    let mut queue = VecDeque::from([seed]);
                    while let Some(p) = queue.pop_front() {
                        let a = global.coords(p);
                        for q in p.axis_neighbors() {
                            if q.i < 0 || q.i >= nx || q.j < 0 || q.j >= ny || q.k < 0 || q.k >= nz
                            {
                                continue;
                            }
                            if self.colors[lin(q)] != 0 {
                                continue;
                            }
                            if self.intersects(surface, global, a, global.coords(q)) {
                                continue;
                            }
                            self.colors[lin(q)] = color;
                            queue.push_back(q);
                        }
                    }
                }
            }
        }

        self.n_regions = (-next_color - 1) as usize;
    }
}

/// 线段-三角形相交（Möller–Trumbore，端点与面内带 eps 容差）
fn segment_hits_triangle(a: DVec3, b: DVec3, tri: [DVec3; 3], eps: f64) -> bool {
    let dir = b - a;
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);

    if det.abs() < 1e-300 {
        // 线段与三角形平面平行：按到平面的距离粗判
        let n = e1.cross(e2);
        let nlen = n.length();
        if nlen == 0.0 {
            return false;
        }
        let d = (a - tri[0]).dot(n / nlen).abs();
        return d <= eps && point_near_triangle(a, tri, eps);
    }

    let inv = 1.0 / det;
    let tvec = a - tri[0];
    let u = tvec.dot(pvec) * inv;
    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv;
    let t = e2.dot(qvec) * inv;

    // 参数容差：把半厚度折算到重心/线段参数上
    let scale = dir.length().max(1e-300);
    let tol = eps / scale;
    u >= -tol && v >= -tol && u + v <= 1.0 + tol && t >= -tol && t <= 1.0 + tol
}

fn point_near_triangle(p: DVec3, tri: [DVec3; 3], eps: f64) -> bool {
    let lo = tri[0].min(tri[1]).min(tri[2]) - DVec3::splat(eps);
    let hi = tri[0].max(tri[1]).max(tri[2]) + DVec3::splat(eps);
    p.cmpge(lo).all() && p.cmple(hi).all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn plate_z05() -> TriangulatedSurface {
        // z = 0.5 的方板，覆盖 [0,1]²
        let nodes = vec![
            DVec3::new(-0.1, -0.1, 0.5),
            DVec3::new(1.1, -0.1, 0.5),
            DVec3::new(1.1, 1.1, 0.5),
            DVec3::new(-0.1, 1.1, 0.5),
        ];
        let elems = vec![[0, 1, 2], [0, 2, 3]];
        TriangulatedSurface::from_parts(nodes, elems)
    }

    fn mesh8() -> GlobalMesh {
        GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 8, 8, 8).unwrap()
    }

    #[test]
    fn test_segment_triangle_basic() {
        let tri = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        assert!(segment_hits_triangle(
            DVec3::new(0.2, 0.2, -1.0),
            DVec3::new(0.2, 0.2, 1.0),
            tri,
            0.0
        ));
        assert!(!segment_hits_triangle(
            DVec3::new(0.9, 0.9, -1.0),
            DVec3::new(0.9, 0.9, 1.0),
            tri,
            0.0
        ));
        // 线段没够到平面
        assert!(!segment_hits_triangle(
            DVec3::new(0.2, 0.2, 0.5),
            DVec3::new(0.2, 0.2, 1.0),
            tri,
            0.0
        ));
    }

    #[test]
    fn test_plate_splits_domain_into_two_regions() {
        let surf = plate_z05();
        let gm = Arc::new(mesh8());
        let dom = SubDomain::solo(Arc::clone(&gm));
        let mut inter = Intersector::new(1e-8);
        inter.track_surface_full_course(&surf, &gm, &dom);

        assert_eq!(inter.n_regions(), 2);
        let below = inter.color_at(&gm, Int3::new(4, 4, 1)).unwrap();
        let above = inter.color_at(&gm, Int3::new(4, 4, 6)).unwrap();
        assert_ne!(below, above);

        // 查询：跨板线段相交，同侧线段不相交
        assert!(inter.intersects(
            &surf,
            &gm,
            DVec3::new(0.5, 0.5, 0.3),
            DVec3::new(0.5, 0.5, 0.7)
        ));
        assert!(!inter.intersects(
            &surf,
            &gm,
            DVec3::new(0.5, 0.5, 0.1),
            DVec3::new(0.5, 0.5, 0.4)
        ));
    }

    #[test]
    fn test_find_color_boundary_sides() {
        let surf = plate_z05();
        let gm = Arc::new(mesh8());
        let dom = SubDomain::solo(Arc::clone(&gm));
        let mut inter = Intersector::new(1e-8);
        inter.track_surface_full_course(&surf, &gm, &dom);

        // 法向朝 +z（结点逆时针排列）
        assert!(surf.elem_norm[0].z > 0.9);

        let above = inter.color_at(&gm, Int3::new(4, 4, 6)).unwrap();
        let mut status = Vec::new();
        inter.find_color_boundary(&surf, &gm, above, &mut status);
        // 上侧区域在正法向一侧
        assert!(status.iter().all(|&s| s == 1), "status = {status:?}");

        let below = inter.color_at(&gm, Int3::new(4, 4, 1)).unwrap();
        inter.find_color_boundary(&surf, &gm, below, &mut status);
        assert!(status.iter().all(|&s| s == 2), "status = {status:?}");
    }

    #[test]
    fn test_scope_excludes_far_surface() {
        // 表面远在子域窗口之外
        let nodes = vec![
            DVec3::new(50.0, 50.0, 50.0),
            DVec3::new(51.0, 50.0, 50.0),
            DVec3::new(50.0, 51.0, 50.0),
        ];
        let surf = TriangulatedSurface::from_parts(nodes, vec![[0, 1, 2]]);
        let gm = Arc::new(mesh8());
        let dom = SubDomain::solo(Arc::clone(&gm));
        let mut inter = Intersector::new(1e-8);
        inter.track_surface_full_course(&surf, &gm, &dom);
        assert!(inter.elements_in_scope().is_empty());
        assert_eq!(inter.n_regions(), 1);
    }
}
