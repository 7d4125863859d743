use std::path::PathBuf;

use thiserror::Error;

/// 流水线错误分类。
///
/// `MissingInput` 在调用外部工具之前检测（对应退出码 1）；
/// `Toolkit` / `Spawn` 为外部工具失败，原样向上传播，不重试。
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unable to find {what} '{}'", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("cannot start '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{tool}' failed ({}): {stderr}", status_text(*status))]
    Toolkit {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{}:{line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("read '{read}' from supplement '{}' is not part of the primary mapping", supplement.display())]
    MergeUniverse { read: String, supplement: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn status_text(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl PipelineError {
    pub fn missing(what: &'static str, path: impl Into<PathBuf>) -> Self {
        PipelineError::MissingInput { what, path: path.into() }
    }

    /// Process exit code for this failure. Tool failures keep the tool's own status.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Toolkit { status: Some(code), .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Exit code for an arbitrary error coming out of the library.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>().map_or(1, PipelineError::exit_code)
}
