use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

/// Metric names the run emits.
pub const METRIC_LOSS: &str = "loss";
pub const METRIC_TRAIN_ACC: &str = "train_accuracy";
pub const METRIC_TEST_ACC: &str = "test_accuracy";

/// Append-only sink for scalar training metrics.
///
/// The loop only ever appends `(metric, step, value)` facts; where they
/// land (files, stdout, a collector) is the sink's business. Sinks must
/// preserve append order per metric.
pub trait MetricLog {
    fn append(&mut self, metric: &str, step: u64, value: f32) -> io::Result<()>;
}

/// File-backed sink with the per-run layout: `<name>.csv` holds one loss
/// value per step under a `Loss` header; `<name>TRAIN_ACC.txt` and
/// `<name>TEST_ACC.txt` hold one `{value}%` line per evaluation.
#[derive(Debug)]
pub struct RunLogs {
    loss: BufWriter<File>,
    train_acc: BufWriter<File>,
    test_acc: BufWriter<File>,
}

impl RunLogs {
    /// Creates (truncating) the three metric files for `name` under `dir`.
    pub fn create(dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let mut loss = BufWriter::new(File::create(dir.join(format!("{name}.csv")))?);
        writeln!(loss, "Loss")?;
        loss.flush()?;

        Ok(Self {
            loss,
            train_acc: BufWriter::new(File::create(dir.join(format!("{name}TRAIN_ACC.txt")))?),
            test_acc: BufWriter::new(File::create(dir.join(format!("{name}TEST_ACC.txt")))?),
        })
    }
}

impl MetricLog for RunLogs {
    fn append(&mut self, metric: &str, _step: u64, value: f32) -> io::Result<()> {
        let out = match metric {
            METRIC_LOSS => {
                writeln!(self.loss, "{value}")?;
                &mut self.loss
            }
            METRIC_TRAIN_ACC => {
                writeln!(self.train_acc, "{value}%")?;
                &mut self.train_acc
            }
            METRIC_TEST_ACC => {
                writeln!(self.test_acc, "{value}%")?;
                &mut self.test_acc
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown metric `{other}`"),
                ));
            }
        };

        // Flushed per append so a crashed run keeps everything logged so far.
        out.flush()
    }
}
