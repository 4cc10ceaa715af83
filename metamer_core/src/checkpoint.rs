//! Versioned binary persistence for built window banks.
//!
//! Every file starts with a format version followed by the serialized
//! payload. Readers reject files whose version differs from
//! [`SNAPSHOT_VERSION`] so stale cache entries are rebuilt instead of being
//! misread.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};
use crate::windows::{WindowBank, WindowParams};

/// Bumped whenever the on-disk layout of a snapshot changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Deterministic binary codec options shared by all snapshot writers.
pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// Components that support deterministic persistence implement this trait.
pub trait Checkpointable: Sized {
    /// Save the current state to `path` using the deterministic codec.
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> MetamerResult<()>;

    /// Load a state from `path`.
    fn load_checkpoint<P: AsRef<Path>>(path: P) -> MetamerResult<Self>;

    /// Writes `snapshot` next to `path` and renames it into place, so
    /// concurrent readers never observe a partial file.
    fn write_snapshot<P, T>(snapshot: &T, path: P) -> MetamerResult<()>
    where
        P: AsRef<Path>,
        T: Serialize,
    {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        let write = || -> MetamerResult<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            codec().serialize_into(&mut writer, snapshot)?;
            writer.flush()?;
            drop(writer);
            std::fs::rename(&tmp, path)?;
            Ok(())
        };
        if let Err(err) = write() {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }

    /// Reads a snapshot written by [`Checkpointable::write_snapshot`].
    fn read_snapshot<P, T>(path: P) -> MetamerResult<T>
    where
        P: AsRef<Path>,
        T: serde::de::DeserializeOwned,
    {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Ok(codec().deserialize_from(&mut reader)?)
    }
}

#[derive(Serialize)]
struct BankEnvelopeRef<'a> {
    version: u32,
    params: &'a WindowParams,
    bank: &'a WindowBank,
}

#[derive(Deserialize)]
struct BankEnvelope {
    version: u32,
    params: WindowParams,
    bank: WindowBank,
}

impl Checkpointable for WindowBank {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> MetamerResult<()> {
        let envelope = BankEnvelopeRef {
            version: SNAPSHOT_VERSION,
            params: self.params(),
            bank: self,
        };
        Self::write_snapshot(&envelope, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> MetamerResult<Self> {
        let path = path.as_ref();
        let envelope: BankEnvelope = Self::read_snapshot(path).map_err(|err| {
            MetamerError::cache_corruption(path.display().to_string(), err.to_string())
        })?;
        if envelope.version != SNAPSHOT_VERSION {
            return Err(MetamerError::cache_corruption(
                path.display().to_string(),
                format!(
                    "snapshot version mismatch: expected {SNAPSHOT_VERSION}, found {}",
                    envelope.version
                ),
            ));
        }
        if &envelope.params != envelope.bank.params() {
            return Err(MetamerError::cache_corruption(
                path.display().to_string(),
                "header parameters disagree with the stored bank",
            ));
        }
        Ok(envelope.bank)
    }
}

/// Loads a bank and checks that it was built from `expected`.
pub fn load_bank_for(path: &Path, expected: &WindowParams) -> MetamerResult<WindowBank> {
    let bank = WindowBank::load_checkpoint(path)?;
    if bank.params() != expected {
        return Err(MetamerError::cache_corruption(
            path.display().to_string(),
            format!("entry was built for {:?}", bank.params()),
        ));
    }
    Ok(bank)
}
