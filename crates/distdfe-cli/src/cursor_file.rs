//! Persisted NSU cursor between runs.
//!
//! The library never stores the cursor; this is the caller side of that
//! contract. The file holds the plain decimal cursor followed by a newline.

use std::path::{Path, PathBuf};

use anyhow::Context;
use distdfe_core::Cursor;
use tracing::info;

pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last persisted cursor, or zero when nothing was saved yet.
    pub fn load(&self) -> anyhow::Result<Cursor> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => text
                .parse()
                .with_context(|| format!("cursor file {} is corrupt", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Cursor::ZERO),
            Err(e) => {
                Err(e).with_context(|| format!("reading cursor file {}", self.path.display()))
            }
        }
    }

    /// Replace the stored cursor. Written to a sibling file first and renamed
    /// into place so a crash never leaves a truncated cursor behind.
    pub fn save(&self, cursor: Cursor) -> anyhow::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, format!("{cursor}\n"))
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing cursor file {}", self.path.display()))?;
        info!(cursor = %cursor, path = %self.path.display(), "cursor saved");
        Ok(())
    }
}
