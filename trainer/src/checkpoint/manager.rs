use std::{
    collections::{HashMap, VecDeque},
    fs, io,
    path::{Path, PathBuf},
};

use log::{info, warn};
use machine_learning::{
    MlErr,
    params::{ParamId, ParamStore},
};
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensorError, SafeTensors, tensor::TensorView};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// Every checkpoint file is named `<prefix>-<step>.safetensors`.
pub const CHECKPOINT_PREFIX: &str = "model.ckpt";

/// Name of the file listing the checkpoints of a snapshot directory.
pub const INDEX_FILE: &str = "checkpoint";

const EXTENSION: &str = "safetensors";
const STEP_KEY: &str = "step";

/// The contents of `INDEX_FILE`, file names relative to the snapshot directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CheckpointIndex {
    latest: String,
    all: Vec<String>,
}

impl CheckpointIndex {
    fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path).map_err(TrainErr::io(&path))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(INDEX_FILE);
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(&path, raw).map_err(TrainErr::io(&path))
    }
}

/// Persists the whole parameter set of a model every so often, keeping only the newest files.
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    max_to_keep: usize,
    kept: VecDeque<PathBuf>,
}

impl CheckpointManager {
    /// Creates a new `CheckpointManager` writing into `dir`.
    ///
    /// Checkpoints already listed in the directory's index count towards the retention limit.
    ///
    /// # Arguments
    /// * `dir` - The snapshot directory, created on the first save.
    /// * `max_to_keep` - The amount of checkpoint files to keep.
    ///
    /// # Returns
    /// A new `CheckpointManager` or an error if an existing index can't be read.
    pub fn open(dir: impl Into<PathBuf>, max_to_keep: usize) -> Result<Self> {
        let dir = dir.into();
        let kept = CheckpointIndex::read(&dir)?
            .map(|index| index.all.iter().map(|name| dir.join(name)).collect())
            .unwrap_or_default();

        Ok(Self {
            dir,
            max_to_keep: max_to_keep.max(1),
            kept,
        })
    }

    /// The checkpoint files on disk, oldest first.
    pub fn kept(&self) -> impl Iterator<Item = &Path> {
        self.kept.iter().map(PathBuf::as_path)
    }

    /// The path of the checkpoint of `step`.
    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir
            .join(format!("{CHECKPOINT_PREFIX}-{step}.{EXTENSION}"))
    }

    /// Writes every parameter of `params`, trainable or not, tagged with `step`. Evicts the
    /// oldest checkpoints past the retention limit.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `step` - The current training step.
    ///
    /// # Returns
    /// The path of the new checkpoint or an error if it couldn't be written.
    pub fn save(&mut self, params: &ParamStore, step: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(TrainErr::io(&self.dir))?;

        let values: Vec<_> = params
            .iter()
            .map(|(_, p)| (p.name(), p.value().as_standard_layout()))
            .collect();

        let views = values
            .iter()
            .map(|(name, value)| {
                let data = value.as_slice().ok_or_else(|| TrainErr::TensorMismatch {
                    name: name.to_string(),
                    reason: "tensor is not contiguous".to_string(),
                })?;
                let view = TensorView::new(Dtype::F32, value.shape().to_vec(), bytemuck::cast_slice(data))?;
                Ok::<_, TrainErr>((name.to_string(), view))
            })
            .collect::<Result<Vec<_>>>()?;

        let metadata = Some(HashMap::from([(STEP_KEY.to_string(), step.to_string())]));

        let path = self.path_for(step);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let written = safetensors::serialize_to_file(views, &metadata, &tmp)
            .map_err(TrainErr::from)
            .and_then(|()| fs::rename(&tmp, &path).map_err(TrainErr::io(&path)));

        if let Err(e) = written {
            match fs::remove_file(&tmp) {
                Err(cleanup) if cleanup.kind() != io::ErrorKind::NotFound => {
                    warn!("failed to delete partial checkpoint {}: {cleanup}", tmp.display())
                }
                _ => {}
            }
            return Err(e);
        }

        self.kept.retain(|p| p != &path);
        self.kept.push_back(path.clone());
        self.evict();

        self.write_index()?;
        info!("saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Deletes the oldest checkpoints past the retention limit. A checkpoint that can't be
    /// deleted stays listed, so the next save tries again.
    fn evict(&mut self) {
        let excess = self.kept.len().saturating_sub(self.max_to_keep);
        let evicted: Vec<_> = self.kept.drain(..excess).collect();

        for old in evicted.into_iter().rev() {
            match fs::remove_file(&old) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("failed to delete old checkpoint {}: {e}", old.display());
                    self.kept.push_front(old);
                }
            }
        }
    }

    fn write_index(&self) -> Result<()> {
        let file_name = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let index = CheckpointIndex {
            latest: self.kept.back().map(file_name).unwrap_or_default(),
            all: self.kept.iter().map(file_name).collect(),
        };

        index.write(&self.dir)
    }
}

/// Finds the checkpoint file `path` refers to: the file itself, the file without its
/// extension or a snapshot directory, whose latest checkpoint is used.
fn resolve(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        let index = CheckpointIndex::read(path)?.ok_or_else(|| TrainErr::NoCheckpoint(path.to_path_buf()))?;
        if index.latest.is_empty() {
            return Err(TrainErr::NoCheckpoint(path.to_path_buf()));
        }
        return Ok(path.join(index.latest));
    }

    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let mut with_ext = path.as_os_str().to_owned();
    with_ext.push(format!(".{EXTENSION}"));
    let with_ext = PathBuf::from(with_ext);

    match with_ext.is_file() {
        true => Ok(with_ext),
        false => Err(TrainErr::NoCheckpoint(path.to_path_buf())),
    }
}

/// Loads every parameter of `params` from a checkpoint.
///
/// Either all parameters are restored or none is: every tensor is checked before the first
/// one is assigned.
///
/// # Arguments
/// * `path` - A checkpoint file, the file without its extension or a snapshot directory.
/// * `params` - The model's parameters.
///
/// # Returns
/// The step the checkpoint was taken at, or an error if it doesn't hold a compatible tensor
/// for every parameter.
pub fn restore(path: &Path, params: &mut ParamStore) -> Result<usize> {
    let path = resolve(path)?;
    let bytes = fs::read(&path).map_err(TrainErr::io(&path))?;

    let (_, metadata) = SafeTensors::read_metadata(&bytes)?;
    let step = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get(STEP_KEY))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TrainErr::MissingMetadata {
            key: STEP_KEY,
            path: path.clone(),
        })?;

    let tensors = SafeTensors::deserialize(&bytes)?;

    let values = params
        .iter()
        .map(|(id, p)| -> Result<(ParamId, ArrayD<f32>)> {
            let view = tensors.tensor(p.name()).map_err(|e| match e {
                SafeTensorError::TensorNotFound(_) => TrainErr::MissingTensor {
                    name: p.name().to_string(),
                    path: path.clone(),
                },
                e => e.into(),
            })?;

            if view.dtype() != Dtype::F32 {
                return Err(TrainErr::TensorMismatch {
                    name: p.name().to_string(),
                    reason: format!("expected f32, got {:?}", view.dtype()),
                });
            }

            if view.shape() != p.shape() {
                return Err(TrainErr::TensorMismatch {
                    name: p.name().to_string(),
                    reason: format!("expected shape {:?}, got {:?}", p.shape(), view.shape()),
                });
            }

            let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let value = ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                .map_err(MlErr::from)?;
            Ok((id, value))
        })
        .collect::<Result<Vec<_>>>()?;

    for (id, value) in values {
        params.get_mut(id).assign(value)?;
    }

    info!("restored {} parameters from {} at step {step}", params.len(), path.display());
    Ok(step)
}
