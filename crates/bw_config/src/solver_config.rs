// crates/bw_config/src/solver_config.rs

//! 求解器配置
//!
//! 整个求解器的输入数据树。全部字段可由 JSON 反序列化，缺省值由
//! `default_*()` 函数给出；`validate()` 做跨字段校验并返回携带
//! 配置键的 [`ConfigError`]。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// 顶层求解器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolverConfig {
    /// 网格与外边界
    #[serde(default)]
    pub mesh: MeshConfig,

    /// 外边界状态（入流/出流）
    #[serde(default)]
    pub bc: BoundaryStateConfig,

    /// 材料（按编号索引；0 为背景材料）
    #[serde(default)]
    pub materials: Vec<MaterialConfig>,

    /// 几何初值区域（依次覆盖）
    #[serde(default)]
    pub initial_conditions: Vec<IcRegionConfig>,

    /// 水平集（每个非背景材料一个）
    #[serde(default)]
    pub level_sets: Vec<LevelSetConfig>,

    /// 多材料算子选项
    #[serde(default)]
    pub multiphase: MultiPhaseConfig,

    /// 相变规则
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,

    /// 内嵌表面
    #[serde(default)]
    pub embedded: EmbeddedConfig,

    /// 数值格式
    #[serde(default)]
    pub scheme: SchemeConfig,

    /// 时间推进
    #[serde(default)]
    pub time: TimeConfig,

    /// 区域分解
    #[serde(default)]
    pub partition: PartitionConfig,

    /// 输出
    #[serde(default)]
    pub output: OutputConfig,
}

impl SolverConfig {
    /// 从 JSON 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// 跨字段校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nmat = self.materials.len();
        if nmat == 0 {
            return Err(ConfigError::invalid("materials", "at least one material is required"));
        }

        self.mesh.validate()?;
        self.time.validate()?;
        self.partition.validate(&self.mesh)?;

        if self.bc.inlet.material_id >= nmat {
            return Err(ConfigError::InvalidMaterialId {
                key: "bc.inlet.material_id".into(),
                id: self.bc.inlet.material_id,
                count: nmat,
            });
        }
        if self.bc.outlet.material_id >= nmat {
            return Err(ConfigError::InvalidMaterialId {
                key: "bc.outlet.material_id".into(),
                id: self.bc.outlet.material_id,
                count: nmat,
            });
        }
        for (n, region) in self.initial_conditions.iter().enumerate() {
            let id = region.state().material_id;
            if id >= nmat {
                return Err(ConfigError::InvalidMaterialId {
                    key: format!("initial_conditions[{n}].material_id"),
                    id,
                    count: nmat,
                });
            }
        }

        // 水平集：材料编号合法、非背景、不重复
        let mut tracked = BTreeSet::new();
        for (n, ls) in self.level_sets.iter().enumerate() {
            if ls.material_id == 0 || ls.material_id >= nmat {
                return Err(ConfigError::InvalidMaterialId {
                    key: format!("level_sets[{n}].material_id"),
                    id: ls.material_id,
                    count: nmat,
                });
            }
            if !tracked.insert(ls.material_id) {
                return Err(ConfigError::DuplicateLevelSetTarget { id: ls.material_id });
            }
        }

        // 相变：端点合法且（非背景端）都被跟踪
        for t in &self.transitions {
            if t.from_id >= nmat || t.to_id >= nmat || t.from_id == t.to_id {
                return Err(ConfigError::invalid(
                    "transitions",
                    format!("bad material pair {} -> {}", t.from_id, t.to_id),
                ));
            }
            for id in [t.from_id, t.to_id] {
                if id != 0 && !tracked.contains(&id) {
                    return Err(ConfigError::UntrackedTransitionMaterial {
                        from: t.from_id,
                        to: t.to_id,
                        id,
                    });
                }
            }
        }

        self.embedded.validate(nmat)?;
        Ok(())
    }
}

// ============================================================
// 网格与外边界
// ============================================================

/// 外边界条件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondKind {
    Inlet,
    #[default]
    Outlet,
    Wall,
    Symmetry,
}

/// 网格配置（均匀矩形域）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    pub x0: f64,
    pub xmax: f64,
    pub y0: f64,
    pub ymax: f64,
    pub z0: f64,
    pub zmax: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    #[serde(default)]
    pub bc_x0: BoundaryCondKind,
    #[serde(default)]
    pub bc_xmax: BoundaryCondKind,
    #[serde(default)]
    pub bc_y0: BoundaryCondKind,
    #[serde(default)]
    pub bc_ymax: BoundaryCondKind,
    #[serde(default)]
    pub bc_z0: BoundaryCondKind,
    #[serde(default)]
    pub bc_zmax: BoundaryCondKind,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            x0: 0.0,
            xmax: 1.0,
            y0: 0.0,
            ymax: 1.0,
            z0: 0.0,
            zmax: 1.0,
            nx: 16,
            ny: 16,
            nz: 16,
            bc_x0: BoundaryCondKind::default(),
            bc_xmax: BoundaryCondKind::default(),
            bc_y0: BoundaryCondKind::default(),
            bc_ymax: BoundaryCondKind::default(),
            bc_z0: BoundaryCondKind::default(),
            bc_zmax: BoundaryCondKind::default(),
        }
    }
}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(ConfigError::invalid("mesh", "cell counts must be positive"));
        }
        if self.xmax <= self.x0 || self.ymax <= self.y0 || self.zmax <= self.z0 {
            return Err(ConfigError::invalid("mesh", "bounds are degenerate"));
        }
        Ok(())
    }
}

/// 一个完整的原始状态 + 材料编号
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateConfig {
    pub density: f64,
    #[serde(default)]
    pub velocity: [f64; 3],
    pub pressure: f64,
    #[serde(default)]
    pub material_id: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            velocity: [0.0; 3],
            pressure: 1.0,
            material_id: 0,
        }
    }
}

/// 入流/出流的外边界状态
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BoundaryStateConfig {
    #[serde(default)]
    pub inlet: StateConfig,
    #[serde(default)]
    pub outlet: StateConfig,
}

// ============================================================
// 材料
// ============================================================

/// 状态方程参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EosConfig {
    /// 刚性气体 p = (γ-1)ρ(e-q) - γ p∞（p∞=0 退化为理想气体）
    StiffenedGas {
        gamma: f64,
        #[serde(default)]
        pressure_constant: f64,
        #[serde(default = "default_cv")]
        cv: f64,
        #[serde(default)]
        e_ref: f64,
    },
}

fn default_cv() -> f64 {
    1.0
}

/// 单个材料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    #[serde(default)]
    pub name: String,

    pub eos: EosConfig,

    /// 密度裁剪下限
    #[serde(default = "default_rho_min")]
    pub rho_min: f64,

    /// 压力裁剪下限
    #[serde(default = "default_p_min")]
    pub p_min: f64,

    /// 相变修复彻底失败时的密度兜底值
    #[serde(default = "default_failsafe_density")]
    pub failsafe_density: f64,
}

fn default_rho_min() -> f64 {
    1e-12
}
fn default_p_min() -> f64 {
    -1e12
}
fn default_failsafe_density() -> f64 {
    1e-6
}

// ============================================================
// 初值区域
// ============================================================

/// 几何初值区域
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IcRegionConfig {
    /// 平面一侧（法向正侧被覆盖）
    Plane {
        center: [f64; 3],
        normal: [f64; 3],
        state: StateConfig,
    },
    /// 球内部
    Sphere {
        center: [f64; 3],
        radius: f64,
        state: StateConfig,
    },
}

impl IcRegionConfig {
    pub fn state(&self) -> &StateConfig {
        match self {
            IcRegionConfig::Plane { state, .. } => state,
            IcRegionConfig::Sphere { state, .. } => state,
        }
    }
}

// ============================================================
// 水平集
// ============================================================

/// 第一层结点的重初始化处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FirstLayerTreatment {
    /// 只做一步 φ/|∇φ| 重标定
    #[default]
    Unconstrained,
    /// 冻结第一层
    Fixed,
    /// 重标定后做 CR-1 平均
    Constrained1,
    /// 重标定后做 CR-2 平均
    Constrained2,
    /// 第一层可动，每个 RK 子步施加 HCR-1 修正
    IterativeConstrained1,
    /// 第一层可动，每个 RK 子步施加 HCR-2 修正
    IterativeConstrained2,
}

/// 水平集外边界条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LevelSetBc {
    #[default]
    ZeroNeumann,
    LinearExtrapolation,
}

/// 重初始化参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinitConfig {
    /// 每多少个时间步重初始化一次（0 = 从不）
    #[serde(default = "default_reinit_frequency")]
    pub frequency: usize,

    /// 伪时间迭代上限
    #[serde(default = "default_reinit_max_its")]
    pub max_its: usize,

    /// 伪时间 CFL
    #[serde(default = "default_reinit_cfl")]
    pub cfl: f64,

    /// 收敛容差（无量纲残量）
    #[serde(default = "default_reinit_tol")]
    pub convergence_tolerance: f64,

    #[serde(default)]
    pub first_layer: FirstLayerTreatment,
}

fn default_reinit_frequency() -> usize {
    1
}
fn default_reinit_max_its() -> usize {
    30
}
fn default_reinit_cfl() -> f64 {
    0.8
}
fn default_reinit_tol() -> f64 {
    1e-4
}

impl Default for ReinitConfig {
    fn default() -> Self {
        Self {
            frequency: default_reinit_frequency(),
            max_its: default_reinit_max_its(),
            cfl: default_reinit_cfl(),
            convergence_tolerance: default_reinit_tol(),
            first_layer: FirstLayerTreatment::default(),
        }
    }
}

/// 单个水平集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSetConfig {
    /// 跟踪的材料编号（必须非 0）
    pub material_id: usize,

    /// 窄带宽度（0 = 全网格模式）
    #[serde(default = "default_bandwidth")]
    pub bandwidth: usize,

    #[serde(default)]
    pub bc: LevelSetBc,

    #[serde(default)]
    pub reinit: ReinitConfig,
}

fn default_bandwidth() -> usize {
    6
}

// ============================================================
// 多材料
// ============================================================

/// 相变状态修复方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseChangeKind {
    #[default]
    RiemannSolution,
    Extrapolation,
}

/// 多材料算子选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPhaseConfig {
    #[serde(default)]
    pub phase_change: PhaseChangeKind,

    /// 是否做潜热簿记
    #[serde(default)]
    pub latent_heat_transfer: bool,

    /// 每多少步做一次水平集冲突消解（0 = 从不）
    #[serde(default = "default_conflict_frequency")]
    pub resolve_conflicts_frequency: usize,

    /// 每多少步做一次孤立背景单元清理（0 = 从不）
    #[serde(default)]
    pub resolve_isolated_cells_frequency: usize,
}

fn default_conflict_frequency() -> usize {
    1
}

impl Default for MultiPhaseConfig {
    fn default() -> Self {
        Self {
            phase_change: PhaseChangeKind::default(),
            latent_heat_transfer: false,
            resolve_conflicts_frequency: default_conflict_frequency(),
            resolve_isolated_cells_frequency: 0,
        }
    }
}

/// 相变规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub from_id: usize,
    pub to_id: usize,
    /// 触发温度
    pub temperature: f64,
    /// 潜热
    pub latent_heat: f64,
}

// ============================================================
// 内嵌表面
// ============================================================

/// 单个内嵌表面
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// 三角网格文件
    pub path: PathBuf,

    /// 每个三角形的 Gauss 点数（0 = 单向耦合，不算力）
    #[serde(default = "default_quadrature")]
    pub quadrature: usize,

    /// Gauss 点沿法向抬升系数（乘 min(dx,dy,dz)）
    #[serde(default = "default_gauss_lofting")]
    pub gauss_lofting: f64,

    /// 固体内侧压力
    #[serde(default)]
    pub internal_pressure: f64,

    /// 表面半厚度
    #[serde(default = "default_surface_thickness")]
    pub surface_thickness: f64,

    /// 润湿面诊断输出文件
    #[serde(default)]
    pub wetting_output: Option<PathBuf>,

    /// 预定义运动学标定器名字（注册表查找）
    #[serde(default)]
    pub dynamics: Option<String>,
}

fn default_quadrature() -> usize {
    3
}
fn default_gauss_lofting() -> f64 {
    0.2
}
fn default_surface_thickness() -> f64 {
    1e-8
}

/// 材料编号 → (表面, 闭包色) 绑定；未被绑定的闭包色视为非活动区
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureBinding {
    pub material_id: usize,
    pub surface: usize,
    pub color: i32,
}

/// 内嵌表面配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddedConfig {
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,

    #[serde(default)]
    pub closure_bindings: Vec<ClosureBinding>,
}

impl EmbeddedConfig {
    pub fn validate(&self, nmat: usize) -> Result<(), ConfigError> {
        for (n, s) in self.surfaces.iter().enumerate() {
            if !matches!(s.quadrature, 0 | 1 | 3 | 4 | 6) {
                return Err(ConfigError::invalid(
                    format!("embedded.surfaces[{n}].quadrature"),
                    format!("unsupported Gauss rule ({} points)", s.quadrature),
                ));
            }
            if s.gauss_lofting < 0.0 {
                return Err(ConfigError::invalid(
                    format!("embedded.surfaces[{n}].gauss_lofting"),
                    "must be non-negative",
                ));
            }
        }
        for (n, b) in self.closure_bindings.iter().enumerate() {
            if b.material_id >= nmat {
                return Err(ConfigError::InvalidMaterialId {
                    key: format!("embedded.closure_bindings[{n}].material_id"),
                    id: b.material_id,
                    count: nmat,
                });
            }
            if b.surface >= self.surfaces.len() {
                return Err(ConfigError::invalid(
                    format!("embedded.closure_bindings[{n}].surface"),
                    "surface index out of range",
                ));
            }
        }
        Ok(())
    }
}

// ============================================================
// 数值格式、时间推进、分解、输出
// ============================================================

/// 数值通量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FluxKind {
    Roe,
    #[default]
    Hllc,
    /// 局部 Lax–Friedrichs
    Llf,
}

/// 斜率限制器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimiterKind {
    #[default]
    GeneralizedMinmod,
    VanAlbada,
    /// 一阶（零斜率）
    None,
}

/// 精确黎曼求解器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactRiemannConfig {
    #[serde(default = "default_riemann_max_its")]
    pub max_its: usize,
    #[serde(default = "default_riemann_tol")]
    pub tolerance: f64,
}

fn default_riemann_max_its() -> usize {
    100
}
fn default_riemann_tol() -> f64 {
    1e-8
}

impl Default for ExactRiemannConfig {
    fn default() -> Self {
        Self {
            max_its: default_riemann_max_its(),
            tolerance: default_riemann_tol(),
        }
    }
}

/// 数值格式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeConfig {
    #[serde(default)]
    pub flux: FluxKind,

    #[serde(default)]
    pub limiter: LimiterKind,

    /// 广义 minmod 参数 θ ∈ [1,2]
    #[serde(default = "default_limiter_theta")]
    pub limiter_theta: f64,

    #[serde(default)]
    pub exact_riemann: ExactRiemannConfig,
}

fn default_limiter_theta() -> f64 {
    1.0
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            flux: FluxKind::default(),
            limiter: LimiterKind::default(),
            limiter_theta: default_limiter_theta(),
            exact_riemann: ExactRiemannConfig::default(),
        }
    }
}

/// 时间积分器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    ForwardEuler,
    RungeKutta2,
    #[default]
    RungeKutta3,
}

/// 时间推进配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(default)]
    pub integrator: IntegratorKind,

    #[serde(default = "default_cfl")]
    pub cfl: f64,

    /// 固定时间步长（None = 按 CFL 自动）
    #[serde(default)]
    pub dt: Option<f64>,

    #[serde(default = "default_max_time")]
    pub max_time: f64,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_cfl() -> f64 {
    0.5
}
fn default_max_time() -> f64 {
    1.0
}
fn default_max_steps() -> usize {
    100000
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            integrator: IntegratorKind::default(),
            cfl: default_cfl(),
            dt: None,
            max_time: default_max_time(),
            max_steps: default_max_steps(),
        }
    }
}

impl TimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cfl <= 0.0 {
            return Err(ConfigError::invalid("time.cfl", "must be positive"));
        }
        if let Some(dt) = self.dt {
            if dt <= 0.0 {
                return Err(ConfigError::invalid("time.dt", "must be positive"));
            }
        }
        Ok(())
    }
}

/// 区域分解配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    #[serde(default = "default_one")]
    pub px: usize,
    #[serde(default = "default_one")]
    pub py: usize,
    #[serde(default = "default_one")]
    pub pz: usize,
}

fn default_one() -> usize {
    1
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self { px: 1, py: 1, pz: 1 }
    }
}

impl PartitionConfig {
    pub fn validate(&self, mesh: &MeshConfig) -> Result<(), ConfigError> {
        if self.px == 0 || self.py == 0 || self.pz == 0 {
            return Err(ConfigError::invalid("partition", "rank counts must be positive"));
        }
        if self.px > mesh.nx || self.py > mesh.ny || self.pz > mesh.nz {
            return Err(ConfigError::invalid(
                "partition",
                "more ranks than cells along an axis",
            ));
        }
        Ok(())
    }
}

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 快照输出目录（空 = 不输出）
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// 每多少步写一次快照（0 = 从不）
    #[serde(default)]
    pub frequency: usize,

    /// 冗长级别（0 安静，1 逐步统计，2 调试）
    #[serde(default)]
    pub verbose: u8,

    /// 探针位置（每步采样最近结点）
    #[serde(default)]
    pub probes: Vec<[f64; 3]>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            frequency: 0,
            verbose: 0,
            probes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SolverConfig {
        let mut cfg = SolverConfig::default();
        cfg.materials.push(MaterialConfig {
            name: "air".into(),
            eos: EosConfig::StiffenedGas {
                gamma: 1.4,
                pressure_constant: 0.0,
                cv: 1.0,
                e_ref: 0.0,
            },
            rho_min: default_rho_min(),
            p_min: default_p_min(),
            failsafe_density: default_failsafe_density(),
        });
        cfg
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_no_materials_rejected() {
        let cfg = SolverConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_level_set_rejected() {
        let mut cfg = minimal();
        cfg.materials.push(cfg.materials[0].clone());
        for _ in 0..2 {
            cfg.level_sets.push(LevelSetConfig {
                material_id: 1,
                bandwidth: 6,
                bc: LevelSetBc::default(),
                reinit: ReinitConfig::default(),
            });
        }
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateLevelSetTarget { id: 1 })
        ));
    }

    #[test]
    fn test_untracked_transition_rejected() {
        let mut cfg = minimal();
        cfg.materials.push(cfg.materials[0].clone());
        cfg.transitions.push(TransitionConfig {
            from_id: 0,
            to_id: 1,
            temperature: 373.0,
            latent_heat: 2.0e6,
        });
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UntrackedTransitionMaterial { .. })
        ));
    }

    #[test]
    fn test_bad_quadrature_rejected() {
        let mut cfg = minimal();
        cfg.embedded.surfaces.push(SurfaceConfig {
            path: "plate.top".into(),
            quadrature: 2,
            gauss_lofting: 0.2,
            internal_pressure: 0.0,
            surface_thickness: 1e-8,
            wetting_output: None,
            dynamics: None,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let text = r#"{
            "mesh": {"x0":0.0,"xmax":1.0,"y0":0.0,"ymax":0.1,"z0":0.0,"zmax":0.1,
                     "nx":100,"ny":1,"nz":1,
                     "bc_x0":"inlet","bc_xmax":"outlet"},
            "materials":[{"eos":{"type":"stiffened_gas","gamma":1.4}}],
            "time":{"cfl":0.5,"max_time":0.2}
        }"#;
        let cfg: SolverConfig = serde_json::from_str(text).unwrap();
        assert_eq!(cfg.mesh.nx, 100);
        assert_eq!(cfg.mesh.bc_x0, BoundaryCondKind::Inlet);
        assert_eq!(cfg.scheme.flux, FluxKind::Hllc);
        assert!(cfg.validate().is_ok());
    }
}
