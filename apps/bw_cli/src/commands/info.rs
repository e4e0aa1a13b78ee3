// apps/bw_cli/src/commands/info.rs

//! info 子命令：打印配置概要

use anyhow::Context;
use bw_config::SolverConfig;
use clap::Args;
use std::path::PathBuf;

/// info 参数
#[derive(Args)]
pub struct InfoArgs {
    /// 配置文件 (JSON)
    pub config: PathBuf,
}

pub fn execute(args: InfoArgs) -> anyhow::Result<()> {
    let cfg = SolverConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    println!("mesh:       {} x {} x {} cells", cfg.mesh.nx, cfg.mesh.ny, cfg.mesh.nz);
    println!(
        "domain:     [{}, {}] x [{}, {}] x [{}, {}]",
        cfg.mesh.x0, cfg.mesh.xmax, cfg.mesh.y0, cfg.mesh.ymax, cfg.mesh.z0, cfg.mesh.zmax
    );
    println!(
        "partition:  {} x {} x {} ranks",
        cfg.partition.px, cfg.partition.py, cfg.partition.pz
    );
    println!("materials:  {}", cfg.materials.len());
    for (n, m) in cfg.materials.iter().enumerate() {
        println!("  [{n}] {}", if m.name.is_empty() { "(unnamed)" } else { &m.name });
    }
    println!("level sets: {}", cfg.level_sets.len());
    for ls in &cfg.level_sets {
        println!(
            "  material {} (bandwidth {})",
            ls.material_id, ls.bandwidth
        );
    }
    println!("transitions: {}", cfg.transitions.len());
    println!("surfaces:    {}", cfg.embedded.surfaces.len());
    println!(
        "scheme:      {:?} flux, {:?} limiter, {:?} integrator",
        cfg.scheme.flux, cfg.scheme.limiter, cfg.time.integrator
    );
    println!(
        "time:        cfl {}, max_time {}, max_steps {}",
        cfg.time.cfl, cfg.time.max_time, cfg.time.max_steps
    );

    match cfg.validate() {
        Ok(()) => println!("status:      valid"),
        Err(e) => println!("status:      INVALID - {e}"),
    }
    Ok(())
}
