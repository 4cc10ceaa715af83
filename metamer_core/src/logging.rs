use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Appends `value` as one JSON line.
pub fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

pub(crate) fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisLogEntry {
    pub iteration: usize,
    pub loss: f32,
    pub learning_rate: f32,
    pub gradient_norm: f32,
    pub pixel_change: f32,
    pub timestamp_ms: u128,
}

/// Appends one synthesis iteration record to `path`.
pub fn log_synthesis_iteration<P: AsRef<Path>>(
    path: P,
    iteration: usize,
    loss: f32,
    learning_rate: f32,
    gradient_norm: f32,
    pixel_change: f32,
) -> io::Result<()> {
    let entry = SynthesisLogEntry {
        iteration,
        loss,
        learning_rate,
        gradient_norm,
        pixel_change,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line(path, &entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn iterations_append_one_line_each() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("run.jsonl");
        log_synthesis_iteration(&path, 1, 0.5, 0.01, 2.0, 0.1).expect("log");
        log_synthesis_iteration(&path, 2, 0.25, 0.01, 1.0, 0.05).expect("log");

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["iteration"], 2);
        assert_eq!(second["loss"], 0.25);
    }
}
