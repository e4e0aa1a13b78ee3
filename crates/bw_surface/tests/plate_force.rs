//! 内嵌表面受力
//!
//! 平板均压算例：总结点力大小等于 p·总面积（1e-9 以内），且按
//! 结点面积份额分配。闭合立方壳在均压下净力为零。

use bw_config::{ClosureBinding, EmbeddedConfig, SurfaceConfig};
use bw_foundation::Int3;
use bw_mesh::{Field3, GlobalMesh, SoloComm, SubDomain};
use bw_physics::Vec5;
use bw_surface::{DynamicsRegistry, EmbeddedBoundaryOperator};
use glam::DVec3;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

fn write_tmp(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("bw_surface_force_tests");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

fn surface_config(path: PathBuf) -> SurfaceConfig {
    SurfaceConfig {
        path,
        quadrature: 3,
        gauss_lofting: 0.2,
        internal_pressure: 0.0,
        surface_thickness: 1e-8,
        wetting_output: None,
        dynamics: None,
    }
}

fn uniform_pressure_domain(n: usize, p: f64) -> (SubDomain, Field3<Vec5>, Field3<i32>) {
    let gm = GlobalMesh::uniform(0.0, 1.0, 0.0, 1.0, 0.0, 1.0, n, n, n).unwrap();
    let dom = SubDomain::solo(Arc::new(gm));
    let v = Field3::new(dom.ghosted, Vec5::new(1.0, 0.0, 0.0, 0.0, p));
    let id = Field3::new(dom.ghosted, 0i32);
    (dom, v, id)
}

const PLATE: &str = "\
# 0.6 x 0.6 plate at z = 0.5
Nodes P
1 0.2 0.2 0.5
2 0.8 0.2 0.5
3 0.8 0.8 0.5
4 0.2 0.8 0.5
Elements P
1 4 1 2 3
2 4 1 3 4
";

#[test]
fn plate_total_force_equals_pressure_times_area() {
    let path = write_tmp("plate.top", PLATE);
    let cfg = EmbeddedConfig {
        surfaces: vec![surface_config(path)],
        closure_bindings: Vec::new(),
    };
    let registry = DynamicsRegistry::new();
    let mut ebo = EmbeddedBoundaryOperator::new(&cfg, &registry).unwrap();

    let (dom, v, id) = uniform_pressure_domain(8, 1.0);
    let comm = SoloComm;
    ebo.track_surfaces(&dom);

    // 负侧润湿（status = 1）：正法向一侧是固体内部（内压 0）
    ebo.inactive_elem_status[0] = vec![1; 2];

    ebo.compute_forces(&dom, &comm, &v, &id).unwrap();

    let total: DVec3 = ebo.forces[0].iter().copied().sum();
    let area = 0.6 * 0.6;

    // 合力大小 = p·A，方向沿 +z（下侧受压）
    assert!(
        (total.length() - area).abs() < 1e-9,
        "total force = {total:?}, expected magnitude {area}"
    );
    assert!((total.z - area).abs() < 1e-9);
    assert!(total.x.abs() < 1e-12 && total.y.abs() < 1e-12);

    // 结点份额：每个三角形把 面积/3 分给三个顶点
    let tri_area = area / 2.0;
    // 结点 1（下标 0）与结点 3（下标 2）各属于两个三角形
    assert!((ebo.forces[0][0].z - 2.0 * tri_area / 3.0).abs() < 1e-9);
    assert!((ebo.forces[0][2].z - 2.0 * tri_area / 3.0).abs() < 1e-9);
    // 结点 2 与 4 各属一个
    assert!((ebo.forces[0][1].z - tri_area / 3.0).abs() < 1e-9);
    assert!((ebo.forces[0][3].z - tri_area / 3.0).abs() < 1e-9);
}

const CUBE: &str = "\
# closed cube [0.3,0.7]^3, outward normals
Nodes C
1 0.3 0.3 0.3
2 0.7 0.3 0.3
3 0.7 0.7 0.3
4 0.3 0.7 0.3
5 0.3 0.3 0.7
6 0.7 0.3 0.7
7 0.7 0.7 0.7
8 0.3 0.7 0.7
Elements C
1 4 1 3 2
2 4 1 4 3
3 4 5 6 7
4 4 5 7 8
5 4 1 2 6
6 4 1 6 5
7 4 4 8 7
8 4 4 7 3
9 4 1 5 8
10 4 1 8 4
11 4 2 3 7
12 4 2 7 6
";

#[test]
fn closed_cube_classifies_interior_and_balances_forces() {
    let path = write_tmp("cube.top", CUBE);
    let cfg = EmbeddedConfig {
        surfaces: vec![surface_config(path)],
        closure_bindings: Vec::new(),
    };
    let registry = DynamicsRegistry::new();
    let mut ebo = EmbeddedBoundaryOperator::new(&cfg, &registry).unwrap();

    let (dom, v, id) = uniform_pressure_domain(10, 1.0);
    let comm = SoloComm;
    ebo.track_surfaces(&dom);

    // 闭合表面把域分成内外两个闭包
    assert_eq!(ebo.intersector(0).n_regions(), 2);

    // 外部区域（含域角）标为活动，内部自动成为非活动
    let exterior = ebo
        .intersector(0)
        .color_at(&dom.global, Int3::new(0, 0, 0))
        .unwrap();
    let bindings = vec![ClosureBinding {
        material_id: 0,
        surface: 0,
        color: exterior,
    }];
    ebo.find_solid_bodies(&dom, &bindings, false).unwrap();

    assert!(!ebo.inactive_colors.is_empty());
    // 外法向朝外 → 内部区域在每个三角形的负侧 → 正侧润湿
    assert!(
        ebo.inactive_elem_status[0].iter().all(|&s| s == 2),
        "status = {:?}",
        ebo.inactive_elem_status[0]
    );

    ebo.compute_forces(&dom, &comm, &v, &id).unwrap();

    // 闭合面上的均压净力为零
    let total: DVec3 = ebo.forces[0].iter().copied().sum();
    assert!(total.length() < 1e-9, "net force = {total:?}");

    // 但单个结点并非零载荷
    assert!(ebo.forces[0].iter().any(|f| f.length() > 1e-3));
}
