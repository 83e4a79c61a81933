use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
    process,
};

use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};
use serde::{Deserialize, Serialize};

use collective::Device;
use ml::{OptimizerState, ParamSpec, SchedState};

use crate::error::{Result, TrainErr};

/// Everything needed to resume a run mid-trajectory.
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    /// Absolute epoch the saved state has completed.
    pub epoch: usize,
    pub params: Vec<f32>,
    pub optimizer: OptimizerState,
    pub scheduler: SchedState,
    /// Device of the rank that wrote the file; remapped on load.
    pub device: Device,
}

/// Optimizer scalars kept out of the tensor table; the flat buffers
/// themselves are stored as `optimizer.<name>` tensors.
#[derive(Serialize, Deserialize)]
struct OptimMeta {
    kind: String,
    lr: f32,
    buffers: Vec<String>,
}

/// Writes `record` to `path` as a safetensors file, atomically.
///
/// Parameter tensors are stored per layout entry under their layout names;
/// write goes to a process-unique temp path first and is renamed into
/// place, so a crash mid-write never leaves a torn checkpoint behind.
pub fn save(record: &CheckpointRecord, layout: &[ParamSpec], path: &Path) -> Result<()> {
    let corrupt = |detail: String| TrainErr::Checkpoint {
        path: path.to_path_buf(),
        detail,
    };

    let mut tensors: Vec<(String, TensorView<'_>)> = Vec::with_capacity(layout.len());
    for spec in layout {
        let end = spec.offset + spec.len;
        let slice = record
            .params
            .get(spec.offset..end)
            .ok_or_else(|| corrupt(format!("layout entry {} exceeds parameter buffer", spec.name)))?;

        let view = TensorView::new(
            Dtype::F32,
            vec![spec.shape.0, spec.shape.1],
            bytemuck::cast_slice(slice),
        )
        .map_err(|e| corrupt(format!("tensor {}: {e}", spec.name)))?;
        tensors.push((spec.name.clone(), view));
    }

    for (name, buffer) in &record.optimizer.buffers {
        let view = TensorView::new(Dtype::F32, vec![buffer.len()], bytemuck::cast_slice(buffer))
            .map_err(|e| corrupt(format!("optimizer buffer {name}: {e}")))?;
        tensors.push((format!("optimizer.{name}"), view));
    }

    let optim_meta = OptimMeta {
        kind: record.optimizer.kind.clone(),
        lr: record.optimizer.lr,
        buffers: record.optimizer.buffers.keys().cloned().collect(),
    };

    let metadata = HashMap::from([
        ("epoch".to_string(), record.epoch.to_string()),
        ("device".to_string(), record.device.index().to_string()),
        (
            "optimizer".to_string(),
            serde_json::to_string(&optim_meta).map_err(|e| corrupt(e.to_string()))?,
        ),
        (
            "scheduler".to_string(),
            serde_json::to_string(&record.scheduler).map_err(|e| corrupt(e.to_string()))?,
        ),
    ]);

    let bytes =
        safetensors::serialize(tensors, &Some(metadata)).map_err(|e| corrupt(e.to_string()))?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let tmp = path.with_extension(format!("st.tmp.{}", process::id()));
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;

    log::debug!(epoch = record.epoch, bytes = bytes.len(); "checkpoint written");
    Ok(())
}

/// Reads a checkpoint back, validating it against the live model layout.
///
/// The record's device is remapped to `device` so a file written by rank 0
/// restores cleanly on any rank. Missing files, foreign layouts and
/// malformed metadata are all fatal: resuming from wrong state would
/// silently corrupt the trajectory.
pub fn load(
    path: &Path,
    layout: &[ParamSpec],
    param_count: usize,
    device: Device,
) -> Result<CheckpointRecord> {
    let corrupt = |detail: String| TrainErr::Checkpoint {
        path: path.to_path_buf(),
        detail,
    };

    let buf = fs::read(path).map_err(|e| corrupt(format!("read failed: {e}")))?;
    let st = SafeTensors::deserialize(&buf).map_err(|e| corrupt(e.to_string()))?;

    let (_, header) = SafeTensors::read_metadata(&buf).map_err(|e| corrupt(e.to_string()))?;
    let metadata = header
        .metadata()
        .as_ref()
        .ok_or_else(|| corrupt("metadata block missing".to_string()))?;

    let field = |key: &str| -> Result<&String> {
        metadata
            .get(key)
            .ok_or_else(|| corrupt(format!("metadata key `{key}` missing")))
    };

    let epoch: usize = field("epoch")?
        .parse()
        .map_err(|e| corrupt(format!("bad epoch: {e}")))?;
    let optim_meta: OptimMeta =
        serde_json::from_str(field("optimizer")?).map_err(|e| corrupt(e.to_string()))?;
    let scheduler: SchedState =
        serde_json::from_str(field("scheduler")?).map_err(|e| corrupt(e.to_string()))?;

    let mut params = vec![0.0f32; param_count];
    for spec in layout {
        let tensor = st
            .tensor(&spec.name)
            .map_err(|e| corrupt(format!("tensor {}: {e}", spec.name)))?;

        // pod_collect_to_vec copies, so unaligned file offsets are fine.
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(tensor.data());
        if values.len() != spec.len {
            return Err(corrupt(format!(
                "tensor {} holds {} values, layout expects {}",
                spec.name,
                values.len(),
                spec.len
            )));
        }

        params[spec.offset..spec.offset + spec.len].copy_from_slice(&values);
    }

    let mut buffers = BTreeMap::new();
    for name in &optim_meta.buffers {
        let tensor = st
            .tensor(&format!("optimizer.{name}"))
            .map_err(|e| corrupt(format!("optimizer buffer {name}: {e}")))?;
        buffers.insert(name.clone(), bytemuck::pod_collect_to_vec(tensor.data()));
    }

    Ok(CheckpointRecord {
        epoch,
        params,
        optimizer: OptimizerState {
            kind: optim_meta.kind,
            lr: optim_meta.lr,
            buffers,
        },
        scheduler,
        device,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml::{Model, Optimizer, Sequential, Sgd, Variant};
    use rand::{SeedableRng, rngs::StdRng};
    use tempfile::tempdir;

    fn sample_record(device: Device) -> (CheckpointRecord, Vec<ParamSpec>, usize) {
        let model = Sequential::build(Variant::Mlp, 6, 3);
        let params = model.init_params(&mut StdRng::seed_from_u64(3));

        let mut opt = Sgd::new(0.05, 0.9, 5e-4, model.size());
        let mut warm = params.clone();
        opt.update_params(&mut warm, &vec![0.01; model.size()]);

        let record = CheckpointRecord {
            epoch: 7,
            params: warm,
            optimizer: opt.state_dict(),
            scheduler: SchedState {
                kind: "one_cycle".to_string(),
                ticks: 42,
            },
            device,
        };
        let size = model.size();
        (record, model.layout(), size)
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.st");
        let (record, layout, size) = sample_record(Device::new(0));

        save(&record, &layout, &path).unwrap();
        let restored = load(&path, &layout, size, Device::new(2)).unwrap();

        assert_eq!(restored.epoch, 7);
        assert_eq!(restored.params, record.params);
        assert_eq!(restored.optimizer.lr, record.optimizer.lr);
        assert_eq!(
            restored.optimizer.buffers["velocity"],
            record.optimizer.buffers["velocity"]
        );
        assert_eq!(restored.scheduler.ticks, 42);
        // Device follows the loading rank, not the writer.
        assert_eq!(restored.device, Device::new(2));
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.st");
        let (record, layout, _) = sample_record(Device::new(0));

        save(&record, &layout, &path).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["run.st".to_string()]);
    }

    #[test]
    fn missing_file_is_a_checkpoint_error() {
        let dir = tempdir().unwrap();
        let (_, layout, size) = sample_record(Device::new(0));

        let err = load(&dir.path().join("absent.st"), &layout, size, Device::new(0))
            .expect_err("missing checkpoint must fail");
        assert!(matches!(err, TrainErr::Checkpoint { .. }));
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.st");
        let (record, layout, _) = sample_record(Device::new(0));
        save(&record, &layout, &path).unwrap();

        let other = Sequential::build(Variant::Linear, 6, 3);
        let err = load(&path, &other.layout(), other.size(), Device::new(0))
            .expect_err("foreign layout must fail");
        assert!(matches!(err, TrainErr::Checkpoint { .. }));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.st");
        let (record, layout, size) = sample_record(Device::new(0));
        save(&record, &layout, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(load(&path, &layout, size, Device::new(0)).is_err());
    }
}
