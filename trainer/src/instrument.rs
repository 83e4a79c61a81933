use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::error::Result;

/// Read-only tap that persists the flat gradient vector at configured
/// global step indices.
///
/// Capture happens after the backward pass and the all-reduce, before the
/// optimizer consumes the gradient; the vector is written in parameter
/// declaration order, one value per line, full float precision.
#[derive(Debug)]
pub struct GradTap {
    steps: BTreeSet<u64>,
    dir: PathBuf,
    prefix: String,
}

impl GradTap {
    pub fn new(steps: BTreeSet<u64>, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            steps,
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// The last instrumented step, if any. Training past it has no
    /// observational value.
    pub fn ceiling(&self) -> Option<u64> {
        self.steps.last().copied()
    }

    fn snapshot_path(&self, step: u64) -> PathBuf {
        self.dir.join(format!("{}_{step}.txt", self.prefix))
    }

    /// Writes `grad` to this tap's directory iff `step` is instrumented.
    /// Returns whether a snapshot was taken.
    pub fn maybe_capture(&self, step: u64, grad: &[f32]) -> Result<bool> {
        if !self.steps.contains(&step) {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path(step);
        write_snapshot(&path, grad)?;

        log::info!(step = step, values = grad.len(); "gradient snapshot written");
        Ok(true)
    }
}

fn write_snapshot(path: &Path, grad: &[f32]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for v in grad {
        // 18 significant digits round-trips any f32 exactly.
        writeln!(out, "{v:.18e}")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn captures_only_configured_steps() {
        let dir = tempdir().unwrap();
        let tap = GradTap::new(BTreeSet::from([3, 6]), dir.path(), "run");

        assert!(!tap.maybe_capture(2, &[1.0]).unwrap());
        assert!(tap.maybe_capture(3, &[1.0, -2.5]).unwrap());
        assert!(!tap.maybe_capture(4, &[1.0]).unwrap());
        assert!(tap.maybe_capture(6, &[0.5]).unwrap());

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["run_3.txt", "run_6.txt"]);
    }

    #[test]
    fn snapshot_is_one_value_per_line_in_order() {
        let dir = tempdir().unwrap();
        let tap = GradTap::new(BTreeSet::from([1]), dir.path(), "g");

        let grad = [0.125f32, -3.0, 1e-7];
        tap.maybe_capture(1, &grad).unwrap();

        let text = fs::read_to_string(dir.path().join("g_1.txt")).unwrap();
        let parsed: Vec<f32> = text.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(parsed, grad);
    }

    #[test]
    fn ceiling_is_the_largest_step() {
        assert_eq!(
            GradTap::new(BTreeSet::from([10, 1000]), "/tmp", "x").ceiling(),
            Some(1000)
        );
        assert_eq!(GradTap::new(BTreeSet::new(), "/tmp", "x").ceiling(), None);
    }
}
