//! JSON artifacts written after a successful retrain: the current
//! prediction slot and the prediction history journal.

pub mod current;
pub mod history;

pub use current::PredictionSlot;
pub use history::HistoryLog;

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Serialize `value` next to `path`, then rename over it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| artifact_err("create directory for", path, e))?;
        }
    }

    let json = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .map_err(|e| artifact_err("serialize", path, e))?;

    persist_atomic(path, |writer| writer.write_all(&json))
}

/// Run `write` against `<path>.tmp`, flush, then rename over `path`. The
/// temp file is removed on every failure after it was created.
fn persist_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    let file = File::create(temp_path).map_err(|e| artifact_err("create temp file for", path, e))?;
    let mut writer = BufWriter::new(file);
    let written = write(&mut writer).and_then(|_| writer.flush());
    drop(writer);
    if let Err(e) = written {
        let _ = fs::remove_file(temp_path);
        return Err(artifact_err("write", path, e));
    }

    fs::rename(temp_path, path).map_err(|e| {
        let _ = fs::remove_file(temp_path);
        artifact_err("rename into", path, e)
    })
}

fn artifact_err(what: &str, path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Artifact(format!("{} {}: {}", what, path.display(), e))
}
