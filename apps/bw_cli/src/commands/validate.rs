// apps/bw_cli/src/commands/validate.rs

//! validate 子命令：加载并校验配置

use anyhow::Context;
use bw_config::SolverConfig;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// validate 参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件 (JSON)
    pub config: PathBuf,
}

pub fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    let cfg = SolverConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.validate()?;
    info!("configuration '{}' is valid", args.config.display());
    Ok(())
}
