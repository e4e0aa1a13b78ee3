// apps/bw_cli/src/commands/run.rs

//! run 子命令：装配求解器并推进到终止时间
//!
//! 分解要求多 rank 时在进程内为每个 rank 起一个线程（SPMD），
//! 步日志与表面输出由 rank 0 负责；快照按 rank 分文件。

use anyhow::Context;
use bw_config::SolverConfig;
use bw_foundation::Int3;
use bw_mesh::{Communicator, SoloComm, ThreadComm};
use bw_physics::{Simulation, StepInfo};
use bw_surface::{DynamicsRegistry, EmbeddedBoundaryOperator};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// run 参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件 (JSON)
    pub config: PathBuf,

    /// 覆盖配置中的快照输出目录
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = SolverConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(out) = args.output {
        cfg.output.path = Some(out);
    }
    cfg.validate()?;

    let nranks = cfg.partition.px * cfg.partition.py * cfg.partition.pz;
    info!(ranks = nranks, "==========  START  ==========");

    if nranks == 1 {
        run_rank(&cfg, &SoloComm)?;
    } else {
        let results = ThreadComm::run(nranks, |comm| run_rank(&cfg, comm));
        for r in results {
            r?;
        }
    }

    Ok(())
}

fn run_rank(cfg: &SolverConfig, comm: &dyn Communicator) -> anyhow::Result<()> {
    let start = Instant::now();
    let is_root = comm.rank() == 0;

    let mut sim = Simulation::new(cfg, comm)?;

    // 内嵌表面
    let registry = DynamicsRegistry::with_builtins();
    let mut ebo = if cfg.embedded.surfaces.is_empty() {
        None
    } else {
        let mut ebo = EmbeddedBoundaryOperator::new(&cfg.embedded, &registry)?;
        ebo.track_surfaces(&sim.dom);
        ebo.find_solid_bodies(&sim.dom, &cfg.embedded.closure_bindings, is_root)?;
        Some(ebo)
    };

    // 初始快照
    write_snapshot(cfg, &sim, comm.rank(), 0)?;
    let mut last_snapshot_step = 0usize;

    if is_root {
        info!("----------  Main Loop  ----------");
    }

    while !sim.done() {
        let step: StepInfo = sim.advance(comm)?;

        // 内嵌表面：运动 → 重跟踪 → 受力
        if let Some(ebo) = ebo.as_mut() {
            ebo.apply_user_defined_dynamics(sim.time);
            let moved = ebo.track_updated_surfaces(&sim.dom);
            if moved > 0.0 {
                // 相交拓扑可能改变
                ebo.find_solid_bodies(&sim.dom, &cfg.embedded.closure_bindings, is_root)?;
            }
            ebo.compute_forces(&sim.dom, comm, &sim.v, &sim.id)?;
            ebo.update_surfaces_prev_and_f_prev();
        }

        if is_root {
            info!(
                "Step {}: t = {:.6e}, dt = {:.6e}, cfl = {:.4e}. Computation time: {:.4e} s.",
                step.step,
                step.time,
                step.dt,
                step.cfl,
                start.elapsed().as_secs_f64()
            );
        }

        write_probes(cfg, &sim, step)?;

        if cfg.output.frequency > 0 && step.step % cfg.output.frequency == 0 {
            write_snapshot(cfg, &sim, comm.rank(), step.step)?;
            last_snapshot_step = step.step;
        }
    }

    // 终态快照（若未写过）
    if sim.step != last_snapshot_step {
        write_snapshot(cfg, &sim, comm.rank(), sim.step)?;
    }

    if is_root {
        info!(
            "NORMAL TERMINATION (t = {:.6e}). Total computation time: {:.4} s.",
            sim.time,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// 文本快照：每 rank 一个文件，行格式 `i j k rho u v w p id [phi…]`
fn write_snapshot(
    cfg: &SolverConfig,
    sim: &Simulation,
    rank: usize,
    step: usize,
) -> anyhow::Result<()> {
    let Some(dir) = &cfg.output.path else {
        return Ok(());
    };
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("solution_{step:06}_r{rank}.txt"));
    let mut out = std::io::BufWriter::new(std::fs::File::create(&path)?);

    writeln!(out, "# step {} t {:.9e}", step, sim.time)?;
    write!(out, "# columns: i j k rho u v w p id")?;
    for ls in &sim.level_sets {
        write!(out, " phi{}", ls.material_id)?;
    }
    writeln!(out)?;

    for p in sim.dom.interior.iter() {
        let v = sim.v[p];
        write!(
            out,
            "{} {} {} {:.9e} {:.9e} {:.9e} {:.9e} {:.9e} {}",
            p.i, p.j, p.k, v[0], v[1], v[2], v[3], v[4], sim.id[p]
        )?;
        for ls in &sim.level_sets {
            write!(out, " {:.9e}", ls.phi[p])?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// 探针输出：对每个探针点采样最近结点，追加一行
fn write_probes(cfg: &SolverConfig, sim: &Simulation, step: StepInfo) -> anyhow::Result<()> {
    if cfg.output.probes.is_empty() {
        return Ok(());
    }
    let Some(dir) = &cfg.output.path else {
        return Ok(());
    };
    std::fs::create_dir_all(dir)?;

    for (n, probe) in cfg.output.probes.iter().enumerate() {
        let node: Int3 = sim
            .dom
            .global
            .find_closest_node(glam_dvec3(*probe), false);
        if !sim.dom.is_here(node, false) {
            continue; // 归拥有它的 rank 输出
        }
        let path = dir.join(format!("probe_{n}.txt"));
        let mut out = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let v = sim.v[node];
        writeln!(
            out,
            "{:.9e} {:.9e} {:.9e} {:.9e} {:.9e} {:.9e} {}",
            step.time, v[0], v[1], v[2], v[3], v[4], sim.id[node]
        )?;
    }
    Ok(())
}

fn glam_dvec3(a: [f64; 3]) -> glam::DVec3 {
    glam::DVec3::new(a[0], a[1], a[2])
}
