// crates/bw_config/src/error.rs

//! 配置错误

use thiserror::Error;

/// 配置错误
///
/// 所有变体携带出错的配置键；配置错误一律致命。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("Cannot read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 解析失败
    #[error("Cannot parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// 非法材料编号
    #[error("Invalid material id {id} in '{key}' (have {count} materials)")]
    InvalidMaterialId { key: String, id: usize, count: usize },

    /// 同一材料被多个水平集跟踪
    #[error("Duplicate level set target: material {id} is tracked more than once")]
    DuplicateLevelSetTarget { id: usize },

    /// 相变规则引用了未被跟踪的材料
    #[error("Phase transition {from} -> {to} involves material {id}, but no level set tracks it")]
    UntrackedTransitionMaterial { from: usize, to: usize, id: usize },

    /// 选项冲突或取值非法
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
