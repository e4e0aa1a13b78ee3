// crates/bw_surface/src/mesh.rs

//! 三角化内嵌表面
//!
//! 存储结点位置（当前/参考）、结点速度与三角形连接，缓存每个
//! 三角形的法向与面积。ASCII 网格格式：
//!
//! ```text
//! # 注释
//! Nodes <tag>
//!   id x y z        （id 从 1 起）
//! Elements <tag>
//!   id type n1 n2 n3
//! ```
//!
//! 关键字大小写不敏感；必须恰有一个结点段和一个单元段；索引
//! 允许有缝隙（告警后静默重编号），重复或未知引用是致命错误。

use crate::error::SurfaceError;
use glam::DVec3;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// 三角化表面
#[derive(Debug, Clone)]
pub struct TriangulatedSurface {
    /// 当前结点位置
    pub x: Vec<DVec3>,
    /// 参考结点位置
    pub x0: Vec<DVec3>,
    /// 结点速度
    pub udot: Vec<DVec3>,
    /// 三角形（结点下标三元组）
    pub elems: Vec<[usize; 3]>,
    /// 单位法向（缓存）
    pub elem_norm: Vec<DVec3>,
    /// 面积（缓存）
    pub elem_area: Vec<f64>,
}

impl TriangulatedSurface {
    pub fn from_parts(nodes: Vec<DVec3>, elems: Vec<[usize; 3]>) -> Self {
        let n = nodes.len();
        let ne = elems.len();
        let mut surf = Self {
            x: nodes.clone(),
            x0: nodes,
            udot: vec![DVec3::ZERO; n],
            elems,
            elem_norm: vec![DVec3::ZERO; ne],
            elem_area: vec![0.0; ne],
        };
        surf.calculate_normals_and_areas();
        surf
    }

    /// 从 ASCII 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SurfaceError> {
        let (nodes, elems) = read_surface_file(path)?;
        Ok(Self::from_parts(nodes, elems))
    }

    /// 重算法向与面积（结点移动后调用）
    pub fn calculate_normals_and_areas(&mut self) {
        for (t, e) in self.elems.iter().enumerate() {
            let ab = self.x[e[1]] - self.x[e[0]];
            let ac = self.x[e[2]] - self.x[e[0]];
            let cross = ab.cross(ac);
            let twice_area = cross.length();
            self.elem_area[t] = 0.5 * twice_area;
            self.elem_norm[t] = if twice_area > 0.0 {
                cross / twice_area
            } else {
                DVec3::ZERO
            };
        }
    }

    /// 三角形顶点坐标
    #[inline]
    pub fn triangle(&self, t: usize) -> [DVec3; 3] {
        let e = self.elems[t];
        [self.x[e[0]], self.x[e[1]], self.x[e[2]]]
    }

    /// 整体包围盒
    pub fn bounding_box(&self) -> (DVec3, DVec3) {
        let mut lo = DVec3::splat(f64::MAX);
        let mut hi = DVec3::splat(f64::MIN);
        for p in &self.x {
            lo = lo.min(*p);
            hi = hi.max(*p);
        }
        (lo, hi)
    }

    /// 相对上一次位置的最大结点位移
    pub fn max_displacement(&self, prev: &[DVec3]) -> f64 {
        self.x
            .iter()
            .zip(prev.iter())
            .map(|(a, b)| (*a - *b).length())
            .fold(0.0, f64::max)
    }
}

/// 读取 ASCII 表面文件，返回（结点，单元）
pub fn read_surface_file(
    path: impl AsRef<Path>,
) -> Result<(Vec<DVec3>, Vec<[usize; 3]>), SurfaceError> {
    let path = path.as_ref();
    let pstr = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| SurfaceError::Open {
        path: pstr.clone(),
        source,
    })?;

    #[derive(PartialEq)]
    enum Reading {
        Nothing,
        Nodes,
        Elements,
    }

    let mut reading = Reading::Nothing;
    let mut found_nodes = false;
    let mut found_elems = false;
    let mut node_list: Vec<(i64, DVec3)> = Vec::new();
    let mut elem_list: Vec<(i64, [i64; 3])> = Vec::new();
    let mut max_node: i64 = 0;
    let mut max_elem: i64 = 0;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let key = tokens.next().expect("non-empty line has a first token");

        if key.eq_ignore_ascii_case("nodes") {
            if found_nodes {
                return Err(SurfaceError::DuplicateSection {
                    section: "nodes (keyword 'Nodes')".into(),
                    path: pstr.clone(),
                });
            }
            reading = Reading::Nodes;
            found_nodes = true;
        } else if key.eq_ignore_ascii_case("elements") {
            if found_elems {
                return Err(SurfaceError::DuplicateSection {
                    section: "elements (keyword 'Elements')".into(),
                    path: pstr.clone(),
                });
            }
            reading = Reading::Elements;
            found_elems = true;
        } else if reading == Reading::Nodes {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed = (fields.len() == 4)
                .then(|| {
                    Some((
                        fields[0].parse::<i64>().ok()?,
                        fields[1].parse::<f64>().ok()?,
                        fields[2].parse::<f64>().ok()?,
                        fields[3].parse::<f64>().ok()?,
                    ))
                })
                .flatten();
            let Some((id, x, y, z)) = parsed else {
                return Err(SurfaceError::BadLine {
                    line: line.into(),
                    path: pstr.clone(),
                    expected: "a node".into(),
                });
            };
            if id < 1 {
                return Err(SurfaceError::BadNodeIndex { id, path: pstr.clone() });
            }
            max_node = max_node.max(id);
            node_list.push((id, DVec3::new(x, y, z)));
        } else if reading == Reading::Elements {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed = (fields.len() == 5)
                .then(|| {
                    let mut v = [0i64; 5];
                    for (slot, f) in v.iter_mut().zip(fields.iter()) {
                        *slot = f.parse::<i64>().ok()?;
                    }
                    Some(v)
                })
                .flatten();
            let Some([id, _ty, n1, n2, n3]) = parsed else {
                return Err(SurfaceError::BadLine {
                    line: line.into(),
                    path: pstr.clone(),
                    expected: "a triangular element".into(),
                });
            };
            if id < 1 {
                return Err(SurfaceError::BadElementIndex { id, path: pstr.clone() });
            }
            max_elem = max_elem.max(id);
            elem_list.push((id, [n1, n2, n3]));
        } else {
            return Err(SurfaceError::BadLine {
                line: line.into(),
                path: pstr.clone(),
                expected: "a section header".into(),
            });
        }
    }

    if !found_nodes {
        return Err(SurfaceError::MissingSection {
            section: "node".into(),
            path: pstr.clone(),
        });
    }
    if !found_elems {
        return Err(SurfaceError::MissingSection {
            section: "element".into(),
            path: pstr.clone(),
        });
    }

    // 结点检查与（必要时的）重编号
    let n_nodes = node_list.len();
    let mut nodes = vec![DVec3::ZERO; n_nodes];
    let mut old2new: BTreeMap<i64, usize> = BTreeMap::new();
    if n_nodes as i64 != max_node {
        warn!(
            max_index = max_node,
            count = n_nodes,
            path = %pstr,
            "node indices of an embedded surface have a gap; renumbering nodes"
        );
        for (current, (id, pos)) in node_list.iter().enumerate() {
            if old2new.insert(*id, current).is_some() {
                return Err(SurfaceError::DuplicateNode {
                    id: *id as usize,
                    path: pstr.clone(),
                });
            }
            nodes[current] = *pos;
        }
    } else {
        let mut check = vec![false; n_nodes];
        for (id, pos) in &node_list {
            let idx = (*id - 1) as usize;
            if check[idx] {
                return Err(SurfaceError::DuplicateNode {
                    id: *id as usize,
                    path: pstr.clone(),
                });
            }
            check[idx] = true;
            nodes[idx] = *pos;
        }
    }

    let lookup = |node: i64, elem: usize| -> Result<usize, SurfaceError> {
        if old2new.is_empty() {
            if node < 1 || node > n_nodes as i64 {
                Err(SurfaceError::UnknownNode {
                    node,
                    elem,
                    path: pstr.clone(),
                })
            } else {
                Ok((node - 1) as usize)
            }
        } else {
            old2new.get(&node).copied().ok_or(SurfaceError::UnknownNode {
                node,
                elem,
                path: pstr.clone(),
            })
        }
    };

    // 单元检查、重编号与存储
    let n_elems = elem_list.len();
    let mut elems = vec![[0usize; 3]; n_elems];
    if n_elems as i64 != max_elem {
        warn!(
            max_index = max_elem,
            count = n_elems,
            path = %pstr,
            "element indices of an embedded surface have a gap; renumbering elements"
        );
        let mut check: BTreeMap<i64, ()> = BTreeMap::new();
        for (current, (id, nds)) in elem_list.iter().enumerate() {
            if check.insert(*id, ()).is_some() {
                return Err(SurfaceError::DuplicateElement {
                    id: *id as usize,
                    path: pstr.clone(),
                });
            }
            elems[current] = [
                lookup(nds[0], *id as usize)?,
                lookup(nds[1], *id as usize)?,
                lookup(nds[2], *id as usize)?,
            ];
        }
    } else {
        let mut check = vec![false; n_elems];
        for (id, nds) in &elem_list {
            let idx = (*id - 1) as usize;
            if check[idx] {
                return Err(SurfaceError::DuplicateElement {
                    id: *id as usize,
                    path: pstr.clone(),
                });
            }
            check[idx] = true;
            elems[idx] = [
                lookup(nds[0], *id as usize)?,
                lookup(nds[1], *id as usize)?,
                lookup(nds[2], *id as usize)?,
            ];
        }
    }

    Ok((nodes, elems))
}
