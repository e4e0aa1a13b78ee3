// crates/bw_surface/src/embedded.rs

//! 内嵌边界算子
//!
//! 管理全部内嵌表面：跟踪（相交器重建）、非活动区识别、表面
//! 受力装配与运动学标定。受力通过三角形 Gauss 积分完成：
//! Gauss 点沿法向抬升离开表面半厚度，有侧性地插值压力，力按
//! `面积 · 权重 · 重心坐标` 分配到三个结点，最后求和规约到
//! root rank。

use crate::dynamics::{DynamicsRegistry, SurfaceDynamics};
use crate::error::SurfaceError;
use crate::intersector::Intersector;
use crate::mesh::TriangulatedSurface;
use bw_config::{ClosureBinding, EmbeddedConfig, SurfaceConfig};
use bw_foundation::{quadrature::triangle_gauss_rule, trilinear, Int3};
use bw_mesh::{Communicator, Field3, GlobalMesh, SubDomain};
use bw_physics::Vec5;
use glam::DVec3;
use std::collections::BTreeSet;
use std::io::Write;
use tracing::warn;

/// 内嵌边界算子
pub struct EmbeddedBoundaryOperator {
    pub surfaces: Vec<TriangulatedSurface>,
    surfaces_prev_x: Vec<Vec<DVec3>>,
    intersectors: Vec<Intersector>,
    configs: Vec<SurfaceConfig>,
    /// 结点载荷（root rank 规约后有效）
    pub forces: Vec<Vec<DVec3>>,
    pub forces_prev: Vec<Vec<DVec3>>,
    /// 每个三角形的非活动侧：0 双侧润湿，1 负侧润湿，2 正侧润湿，
    /// 3 双侧都不润湿
    pub inactive_elem_status: Vec<Vec<i32>>,
    /// （表面, 闭包色）对，区域内部非活动
    pub inactive_colors: BTreeSet<(usize, i32)>,
    dynamics: Vec<Option<Box<dyn SurfaceDynamics>>>,
    /// 非活动材料编号（被嵌入固体覆盖的单元）
    pub inactive_material_id: Option<i32>,
}

impl EmbeddedBoundaryOperator {
    pub fn new(cfg: &EmbeddedConfig, registry: &DynamicsRegistry) -> Result<Self, SurfaceError> {
        let mut surfaces = Vec::with_capacity(cfg.surfaces.len());
        let mut intersectors = Vec::with_capacity(cfg.surfaces.len());
        let mut dynamics = Vec::with_capacity(cfg.surfaces.len());

        for sc in &cfg.surfaces {
            let surf = TriangulatedSurface::from_file(&sc.path)?;
            intersectors.push(Intersector::new(sc.surface_thickness));
            dynamics.push(match &sc.dynamics {
                Some(name) => Some(registry.create(name)?),
                None => None,
            });
            surfaces.push(surf);
        }

        let forces: Vec<Vec<DVec3>> = surfaces.iter().map(|s| vec![DVec3::ZERO; s.x.len()]).collect();
        let status: Vec<Vec<i32>> = surfaces.iter().map(|s| vec![0; s.elems.len()]).collect();
        let prev_x: Vec<Vec<DVec3>> = surfaces.iter().map(|s| s.x.clone()).collect();

        Ok(Self {
            forces_prev: forces.clone(),
            forces,
            surfaces_prev_x: prev_x,
            inactive_elem_status: status,
            inactive_colors: BTreeSet::new(),
            intersectors,
            configs: cfg.surfaces.clone(),
            surfaces,
            dynamics,
            inactive_material_id: None,
        })
    }

    pub fn num_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn intersector(&self, surf: usize) -> &Intersector {
        &self.intersectors[surf]
    }

    // ============================================================
    // 跟踪
    // ============================================================

    /// 初次跟踪所有表面
    pub fn track_surfaces(&mut self, dom: &SubDomain) {
        for (surf, inter) in self.surfaces.iter_mut().zip(self.intersectors.iter_mut()) {
            surf.calculate_normals_and_areas();
            inter.track_surface_full_course(surf, &dom.global, dom);
        }
    }

    /// 表面运动后的重跟踪；返回最大结点位移
    pub fn track_updated_surfaces(&mut self, dom: &SubDomain) -> f64 {
        let mut max_dist = 0.0f64;
        for (n, surf) in self.surfaces.iter_mut().enumerate() {
            if self.dynamics[n].is_none() {
                continue; // 固定表面
            }
            surf.calculate_normals_and_areas();
            let d = self.intersectors[n].recompute_full_course(
                surf,
                &dom.global,
                dom,
                &self.surfaces_prev_x[n],
            );
            max_dist = max_dist.max(d);
        }
        max_dist
    }

    /// 调用运动学标定器并更新 X = X0 + disp
    pub fn apply_user_defined_dynamics(&mut self, t: f64) {
        for (n, surf) in self.surfaces.iter_mut().enumerate() {
            let Some(dynamics) = self.dynamics[n].as_mut() else {
                continue;
            };
            let mut disp = vec![DVec3::ZERO; surf.x.len()];
            let x_snapshot = surf.x.clone();
            dynamics.evaluate(t, &surf.x0, &x_snapshot, &mut disp, &mut surf.udot);
            for (x, (x0, d)) in surf.x.iter_mut().zip(surf.x0.iter().zip(disp.iter())) {
                *x = *x0 + *d;
            }
        }
    }

    /// 快照当前载荷与结点位置
    pub fn update_surfaces_prev_and_f_prev(&mut self) {
        for n in 0..self.surfaces.len() {
            self.forces_prev[n].copy_from_slice(&self.forces[n]);
            self.surfaces_prev_x[n].copy_from_slice(&self.surfaces[n].x);
        }
    }

    // ============================================================
    // 非活动区识别
    // ============================================================

    /// 找出非活动闭包色并分类每个三角形的非活动侧
    ///
    /// `id2closure` 里出现的 (表面, 色) 是活动区，其余闭包色的
    /// 内部视为固体。`is_root` 为真时写润湿面诊断文件。
    pub fn find_solid_bodies(
        &mut self,
        dom: &SubDomain,
        id2closure: &[ClosureBinding],
        is_root: bool,
    ) -> Result<(), SurfaceError> {
        // 第一部分：非活动闭包色
        self.inactive_colors.clear();
        for surf in 0..self.surfaces.len() {
            let n_regions = self.intersectors[surf].n_regions() as i32;
            for color in (-n_regions..=-1).rev() {
                let active = id2closure
                    .iter()
                    .any(|b| b.surface == surf && b.color == color);
                if !active {
                    self.inactive_colors.insert((surf, color));
                }
            }
        }

        // 第二部分：每个三角形的非活动侧，多个色按位合并（1+2→3）
        for (surf, status) in self.inactive_elem_status.iter_mut().enumerate() {
            status.clear();
            status.resize(self.surfaces[surf].elems.len(), 0);
        }

        let mut touched = vec![false; self.surfaces.len()];
        for &(surf, color) in &self.inactive_colors {
            let status = &mut self.inactive_elem_status[surf];
            if touched[surf] {
                let mut tmp = Vec::new();
                self.intersectors[surf].find_color_boundary(
                    &self.surfaces[surf],
                    &dom.global,
                    color,
                    &mut tmp,
                );
                debug_assert_eq!(tmp.len(), status.len());
                for (s, t) in status.iter_mut().zip(tmp.iter()) {
                    match t {
                        1 => {
                            if *s == 0 {
                                *s = 1;
                            } else if *s == 2 {
                                *s = 3;
                            }
                        }
                        2 => {
                            if *s == 0 {
                                *s = 2;
                            } else if *s == 1 {
                                *s = 3;
                            }
                        }
                        3 => *s = 3,
                        _ => {}
                    }
                }
            } else {
                self.intersectors[surf].find_color_boundary(
                    &self.surfaces[surf],
                    &dom.global,
                    color,
                    status,
                );
                touched[surf] = true;
            }
        }

        if is_root {
            self.write_wetting_files()?;
        }
        Ok(())
    }

    /// 润湿面诊断：每个三角形一条线段，方向表明润湿侧，长度正比
    /// 于中位三角形面积的平方根
    fn write_wetting_files(&self) -> Result<(), SurfaceError> {
        for (n, sc) in self.configs.iter().enumerate() {
            let Some(path) = &sc.wetting_output else {
                continue;
            };
            let surf = &self.surfaces[n];
            let status = &self.inactive_elem_status[n];
            if surf.elems.is_empty() {
                continue;
            }

            // 中位面积决定线段长度
            let mut areas = surf.elem_area.clone();
            let mid = areas.len() / 2;
            areas.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).expect("areas are finite"));
            let mid_area = areas[mid].max(0.0);
            let amplification = 2.0;
            let marker_length = amplification * (mid_area * 2.0).sqrt();

            let mut out = std::fs::File::create(path).map_err(|source| SurfaceError::Write {
                path: path.display().to_string(),
                source,
            })?;
            let werr = |source| SurfaceError::Write {
                path: path.display().to_string(),
                source,
            };

            writeln!(out, "Nodes WettedSurfacePoints").map_err(werr)?;
            for (t, e) in surf.elems.iter().enumerate() {
                let c = (surf.x[e[0]] + surf.x[e[1]] + surf.x[e[2]]) / 3.0;
                let nvec = surf.elem_norm[t];
                let (p, q) = match status[t] {
                    0 => (c - marker_length * nvec, c + marker_length * nvec),
                    1 => (c, c - marker_length * nvec),
                    2 => (c, c + marker_length * nvec),
                    _ => (c, c),
                };
                writeln!(out, "{:>10} {:>14.6e} {:>14.6e} {:>14.6e}", 2 * t + 1, p.x, p.y, p.z)
                    .map_err(werr)?;
                writeln!(out, "{:>10} {:>14.6e} {:>14.6e} {:>14.6e}", 2 * t + 2, q.x, q.y, q.z)
                    .map_err(werr)?;
            }
            writeln!(out, "Elements Markers using WettedSurfacePoints").map_err(werr)?;
            for t in 0..surf.elems.len() {
                writeln!(out, "{:>10}  1  {:>10} {:>10}", t + 1, 2 * t + 1, 2 * t + 2)
                    .map_err(werr)?;
            }
        }
        Ok(())
    }

    // ============================================================
    // 受力装配
    // ============================================================

    /// Gauss 点抬升高度：系数 × 覆盖单元的最小间距
    fn calculate_lofting_height(&self, global: &GlobalMesh, p: DVec3, factor: f64) -> f64 {
        if factor == 0.0 {
            return 0.0;
        }
        debug_assert!(factor > 0.0);
        let Some(cell) = global.find_cell_covering_point(p, true) else {
            // 网格之外的三角形不抬升，也不会得到力
            return 0.0;
        };
        factor * global.dxyz(cell).min_element()
    }

    /// 装配所有表面的结点载荷并规约到 root
    pub fn compute_forces(
        &mut self,
        dom: &SubDomain,
        comm: &dyn Communicator,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
    ) -> Result<(), SurfaceError> {
        let global = &dom.global;

        for surf_n in 0..self.surfaces.len() {
            let np = self.configs[surf_n].quadrature;

            // np = 0：单向耦合，不算力
            self.forces[surf_n].fill(DVec3::ZERO);
            if np == 0 {
                continue;
            }

            let rule = triangle_gauss_rule(np)?;
            let lofting = self.configs[surf_n].gauss_lofting;
            let internal_pressure = self.configs[surf_n].internal_pressure;

            let scope: Vec<usize> = self.intersectors[surf_n].elements_in_scope().to_vec();
            for tid in scope {
                let tri = self.surfaces[surf_n].triangle(tid);
                let nodes = self.surfaces[surf_n].elems[tid];
                let area = self.surfaces[surf_n].elem_area[tid];
                let base_normal = self.surfaces[surf_n].elem_norm[tid];
                let status = self.inactive_elem_status[surf_n][tid];
                debug_assert!((base_normal.length() - 1.0).abs() < 1e-12);

                let mut tg = vec![DVec3::ZERO; np];

                for side in 0..2usize {
                    let normal = if side == 0 { base_normal } else { -base_normal };

                    for (g, gp) in rule.iter().enumerate() {
                        let mut xg =
                            gp.bary.x * tri[0] + gp.bary.y * tri[1] + gp.bary.z * tri[2];

                        // 抬升（多个 rank 可能处理同一点，结果必须一致）
                        let loft = self.calculate_lofting_height(global, xg, lofting);
                        xg += loft * normal;

                        // 只有覆盖该点的 rank 计算
                        let Some(cell) = global.find_cell_covering_point(xg, false) else {
                            continue;
                        };
                        if !dom.is_here(cell, false) {
                            continue;
                        }

                        if status == 3 || status == side as i32 + 1 {
                            // 此侧面向固体内部
                            tg[g] += -internal_pressure * normal;
                        } else {
                            tg[g] += self.calculate_traction_at_point(dom, v, id, xg, normal);
                        }
                    }
                }

                // 积分：每个结点从每个 Gauss 点分到一份载荷
                for (g, gp) in rule.iter().enumerate() {
                    let load = tg[g] * area;
                    for (node_n, &node) in nodes.iter().enumerate() {
                        self.forces[surf_n][node] += gp.weight * gp.bary[node_n] * load;
                    }
                }
            }

            // root rank 汇总整个表面的载荷
            let mut flat: Vec<f64> = Vec::with_capacity(3 * self.forces[surf_n].len());
            for f in &self.forces[surf_n] {
                flat.extend_from_slice(&[f.x, f.y, f.z]);
            }
            comm.reduce_sum_f64_to_root(&mut flat);
            for (f, chunk) in self.forces[surf_n].iter_mut().zip(flat.chunks_exact(3)) {
                *f = DVec3::new(chunk[0], chunk[1], chunk[2]);
            }
        }

        Ok(())
    }

    /// 有侧性的压力插值：−p·n̂
    ///
    /// 覆盖单元的八个角结点里，与抬升参考点之间不跨任何表面、
    /// 且位于物理域内、非非活动材料的角是"同侧角"。一个都没有
    /// 时抬升量翻倍重试（至多十次）；非同侧角的压力用同侧角的
    /// 均值填充，再做三线性插值。
    fn calculate_traction_at_point(
        &self,
        dom: &SubDomain,
        v: &Field3<Vec5>,
        id: &Field3<i32>,
        p: DVec3,
        normal: DVec3,
    ) -> DVec3 {
        let global = &dom.global;
        let Some((ijk0, xi)) = global.find_element_covering_point(p, true) else {
            return DVec3::ZERO;
        };

        // 初始抬升：离开所有表面的半厚度
        let mut loft = self
            .intersectors
            .iter()
            .map(|x| x.half_thickness())
            .fold(0.0f64, f64::max)
            * 2.0;
        if loft == 0.0 {
            loft = 1e-12;
        }

        const MAX_ITER: usize = 10;
        let mut sameside = [[[false; 2]; 2]; 2];
        let mut found_sameside = false;
        let mut iter = 0;

        while iter < MAX_ITER {
            let ref_point = p + loft * normal;
            found_sameside = false;

            for dk in 0..2 {
                for dj in 0..2 {
                    for di in 0..2 {
                        let cell = Int3::new(
                            ijk0.i + di as i32,
                            ijk0.j + dj as i32,
                            ijk0.k + dk as i32,
                        );

                        if !dom.is_here(cell, true) || dom.outside_physical_domain(cell) {
                            // 域外幽灵不可用：表面未必伸进幽灵层，
                            // 相交查询在那里不可靠
                            sameside[dk][dj][di] = false;
                            continue;
                        }

                        if let Some(inactive) = self.inactive_material_id {
                            if id[cell] == inactive {
                                sameside[dk][dj][di] = false;
                                continue;
                            }
                        }

                        let x = global.coords(cell);
                        let mut clear = true;
                        for (inter, surf) in self.intersectors.iter().zip(self.surfaces.iter()) {
                            if inter.intersects(surf, global, x, ref_point) {
                                clear = false;
                                break;
                            }
                        }
                        sameside[dk][dj][di] = clear;
                        if clear {
                            found_sameside = true;
                        }
                    }
                }
            }

            if found_sameside {
                break;
            }
            loft *= 2.0;
            iter += 1;
        }

        if iter >= 5 && found_sameside {
            warn!(
                loft,
                iter,
                point = ?p,
                "applied a large lofting height to find valid nodes for interpolating pressure"
            );
        }

        // 同侧角收集压力；缺角填均值
        let mut pressure = [[[0.0f64; 2]; 2]; 2];
        let mut total = 0.0;
        let mut count = 0usize;
        for dk in 0..2 {
            for dj in 0..2 {
                for di in 0..2 {
                    if !sameside[dk][dj][di] {
                        continue;
                    }
                    let cell = Int3::new(
                        ijk0.i + di as i32,
                        ijk0.j + dj as i32,
                        ijk0.k + dk as i32,
                    );
                    pressure[dk][dj][di] = v[cell].pressure();
                    total += pressure[dk][dj][di];
                    count += 1;
                }
            }
        }

        let avg = if count == 0 {
            warn!(
                point = ?p,
                "no valid active nodes for interpolating pressure at Gauss point; \
                 try adjusting surface thickness"
            );
            0.0
        } else {
            total / count as f64
        };
        for dk in 0..2 {
            for dj in 0..2 {
                for di in 0..2 {
                    if !sameside[dk][dj][di] {
                        pressure[dk][dj][di] = avg;
                    }
                }
            }
        }

        let corners = [
            pressure[0][0][0],
            pressure[0][0][1],
            pressure[0][1][0],
            pressure[0][1][1],
            pressure[1][0][0],
            pressure[1][0][1],
            pressure[1][1][0],
            pressure[1][1][1],
        ];
        let p_interp = trilinear(corners, xi);

        -p_interp * normal
    }
}
