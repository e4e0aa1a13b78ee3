//! Sod 激波管
//!
//! 100×1×1 网格，γ=1.4，左 (1,0,1) / 右 (0.125,0,0.1)，CFL 0.5，
//! 推进到 t=0.2。校验入流端密度、激波位置 (~0.85) 与波后密度
//! (~0.266)。

use bw_config::{
    BoundaryCondKind, EosConfig, IcRegionConfig, MaterialConfig, SolverConfig, StateConfig,
};
use bw_foundation::Int3;
use bw_mesh::SoloComm;
use bw_physics::Simulation;

fn sod_config() -> SolverConfig {
    let mut cfg = SolverConfig::default();
    cfg.mesh.x0 = 0.0;
    cfg.mesh.xmax = 1.0;
    cfg.mesh.y0 = 0.0;
    cfg.mesh.ymax = 0.01;
    cfg.mesh.z0 = 0.0;
    cfg.mesh.zmax = 0.01;
    cfg.mesh.nx = 100;
    cfg.mesh.ny = 1;
    cfg.mesh.nz = 1;
    cfg.mesh.bc_x0 = BoundaryCondKind::Inlet;
    cfg.mesh.bc_xmax = BoundaryCondKind::Outlet;
    cfg.mesh.bc_y0 = BoundaryCondKind::Symmetry;
    cfg.mesh.bc_ymax = BoundaryCondKind::Symmetry;
    cfg.mesh.bc_z0 = BoundaryCondKind::Symmetry;
    cfg.mesh.bc_zmax = BoundaryCondKind::Symmetry;

    cfg.materials.push(MaterialConfig {
        name: "gamma-law gas".into(),
        eos: EosConfig::StiffenedGas {
            gamma: 1.4,
            pressure_constant: 0.0,
            cv: 1.0,
            e_ref: 0.0,
        },
        rho_min: 1e-12,
        p_min: 1e-12,
        failsafe_density: 1e-6,
    });

    cfg.bc.inlet = StateConfig {
        density: 1.0,
        velocity: [0.0; 3],
        pressure: 1.0,
        material_id: 0,
    };
    cfg.bc.outlet = StateConfig {
        density: 0.125,
        velocity: [0.0; 3],
        pressure: 0.1,
        material_id: 0,
    };

    cfg.initial_conditions.push(IcRegionConfig::Plane {
        center: [0.5, 0.0, 0.0],
        normal: [1.0, 0.0, 0.0],
        state: StateConfig {
            density: 0.125,
            velocity: [0.0; 3],
            pressure: 0.1,
            material_id: 0,
        },
    });

    cfg.time.cfl = 0.5;
    cfg.time.max_time = 0.2;
    cfg.time.max_steps = 10000;
    cfg
}

#[test]
fn sod_shock_position_and_post_shock_density() {
    let cfg = sod_config();
    let comm = SoloComm;
    let mut sim = Simulation::new(&cfg, &comm).expect("simulation assembles");

    while !sim.done() {
        sim.advance(&comm).expect("step succeeds");
    }
    assert!((sim.time - 0.2).abs() < 1e-12);

    let profile: Vec<f64> = (0..100)
        .map(|i| sim.v[Int3::new(i, 0, 0)].rho())
        .collect();

    // 入流区保持左状态
    assert!((profile[2] - 1.0).abs() < 1e-3, "inlet rho = {}", profile[2]);
    // 远右侧未受扰
    assert!((profile[97] - 0.125).abs() < 1e-3, "right rho = {}", profile[97]);

    // 波后平台（接触与激波之间，x ≈ 0.75–0.82）约 0.266
    let x_to_i = |x: f64| (x * 100.0) as usize;
    let post_shock = profile[x_to_i(0.80)];
    assert!(
        (post_shock - 0.266).abs() < 0.02,
        "post-shock density = {post_shock}"
    );

    // 激波位置：密度从 ~0.266 落到 ~0.125 的过渡点应在 x ≈ 0.85
    let mut shock_x = None;
    for i in x_to_i(0.70)..99 {
        if profile[i] > 0.19 && profile[i + 1] <= 0.19 {
            shock_x = Some((i as f64 + 1.0) / 100.0);
            break;
        }
    }
    let shock_x = shock_x.expect("shock front exists");
    assert!(
        (0.82..=0.88).contains(&shock_x),
        "shock at x = {shock_x}"
    );

    // 接触间断左侧（稀疏波后）密度 ≈ 0.426
    let star_left = profile[x_to_i(0.60)];
    assert!(
        (star_left - 0.426).abs() < 0.03,
        "star-left density = {star_left}"
    );
}

#[test]
fn sod_mass_is_conserved_up_to_boundary_flux() {
    // 对称镜像构型（两端都是入流自身状态）下总质量守恒
    let mut cfg = sod_config();
    cfg.time.max_time = 0.05;
    let comm = SoloComm;
    let mut sim = Simulation::new(&cfg, &comm).unwrap();

    let cell_vol = (1.0 / 100.0) * 0.01 * 0.01;
    let mass0: f64 = (0..100)
        .map(|i| sim.v[Int3::new(i, 0, 0)].rho() * cell_vol)
        .sum();

    while !sim.done() {
        sim.advance(&comm).unwrap();
    }

    let mass1: f64 = (0..100)
        .map(|i| sim.v[Int3::new(i, 0, 0)].rho() * cell_vol)
        .sum();

    // t=0.05 时波远未到边界：边界通量为常状态对流（两端速度为零），
    // 总质量应机器精度守恒
    assert!(
        (mass1 - mass0).abs() < 1e-12 * mass0.abs().max(1.0) * 100.0,
        "mass drift {} -> {}",
        mass0,
        mass1
    );
}
