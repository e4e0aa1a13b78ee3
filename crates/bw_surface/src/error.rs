// crates/bw_surface/src/error.rs

//! 表面网格错误

use thiserror::Error;

/// 表面文件与几何错误（全部致命）
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Embedded structure surface mesh doesn't exist ({path}): {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Found multiple sets of {section} in {path}")]
    DuplicateSection { section: String, path: String },

    #[error("Unable to find {section} set in {path}")]
    MissingSection { section: String, path: String },

    #[error("Cannot interpret line '{line}' (in {path}). Expecting {expected}")]
    BadLine {
        line: String,
        path: String,
        expected: String,
    },

    #[error("Detected a node with index {id} in embedded surface file {path}")]
    BadNodeIndex { id: i64, path: String },

    #[error("Detected an element with index {id} in embedded surface file {path}")]
    BadElementIndex { id: i64, path: String },

    #[error("Found duplicate node (id: {id}) in embedded surface file {path}")]
    DuplicateNode { id: usize, path: String },

    #[error("Found duplicate element (id: {id}) in embedded surface file {path}")]
    DuplicateElement { id: usize, path: String },

    #[error("Detected unknown node number ({node}) in element {elem} ({path})")]
    UnknownNode { node: i64, elem: usize, path: String },

    #[error("Cannot write file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown surface dynamics calculator '{name}'")]
    UnknownDynamics { name: String },

    #[error("{0}")]
    Quadrature(#[from] bw_foundation::BwError),
}
