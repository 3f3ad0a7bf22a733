use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use machine_learning::MlErr;
use rayon::ThreadPoolBuildError;
use safetensors::SafeTensorError;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Trainer failures, every one of them aborts the run.
#[derive(Debug)]
pub enum TrainErr {
    Ml(MlErr),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    SafeTensor(SafeTensorError),
    Json(serde_json::Error),
    ThreadPool(ThreadPoolBuildError),
    InvalidConfig(String),
    EmptyDataset,
    BatchShape {
        images: Vec<usize>,
        labels: Vec<usize>,
    },
    MalformedSample {
        path: PathBuf,
        got: usize,
        expected: usize,
    },
    MissingTensor {
        name: String,
        path: PathBuf,
    },
    TensorMismatch {
        name: String,
        reason: String,
    },
    MissingMetadata {
        key: &'static str,
        path: PathBuf,
    },
    NoCheckpoint(PathBuf),
}

impl TrainErr {
    /// Wraps an io error with the path it happened on.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Ml(e) => write!(f, "{e}"),
            TrainErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            TrainErr::SafeTensor(e) => write!(f, "checkpoint format error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::ThreadPool(e) => write!(f, "failed to build the thread pool: {e}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            TrainErr::EmptyDataset => write!(f, "the dataset has no examples"),
            TrainErr::BatchShape { images, labels } => write!(
                f,
                "labels of shape {labels:?} don't match images of shape {images:?}"
            ),
            TrainErr::MalformedSample {
                path,
                got,
                expected,
            } => write!(
                f,
                "malformed sample {}: got {got} bytes, expected {expected}",
                path.display()
            ),
            TrainErr::MissingTensor { name, path } => {
                write!(f, "checkpoint {} has no tensor '{name}'", path.display())
            }
            TrainErr::TensorMismatch { name, reason } => {
                write!(f, "checkpoint tensor '{name}' doesn't fit the model: {reason}")
            }
            TrainErr::MissingMetadata { key, path } => {
                write!(f, "checkpoint {} has no '{key}' metadata", path.display())
            }
            TrainErr::NoCheckpoint(path) => {
                write!(f, "no checkpoint found at {}", path.display())
            }
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Ml(e) => Some(e),
            TrainErr::Io { source, .. } => Some(source),
            TrainErr::SafeTensor(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            TrainErr::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<SafeTensorError> for TrainErr {
    fn from(value: SafeTensorError) -> Self {
        Self::SafeTensor(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ThreadPoolBuildError> for TrainErr {
    fn from(value: ThreadPoolBuildError) -> Self {
        Self::ThreadPool(value)
    }
}
