use crate::scenario::Viewport;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk store of accepted reference rasters, keyed by shot name
/// (`{browser}_{scenario}.png`). Baselines are only ever written through
/// [`BaselineStore::accept`]; nothing deletes them.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, shot: &str) -> PathBuf {
        self.dir.join(shot)
    }

    pub fn contains(&self, shot: &str) -> bool {
        self.path_for(shot).is_file()
    }

    /// Reads only the PNG header, so probing a tall baseline stays cheap.
    pub fn dimensions(&self, shot: &str) -> Option<Viewport> {
        image::image_dimensions(self.path_for(shot))
            .ok()
            .map(|(width, height)| Viewport { width, height })
    }

    /// Persists a capture as the accepted baseline for `shot`.
    pub fn accept(&self, shot: &str, captured: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::copy(captured, self.path_for(shot))?;
        Ok(())
    }
}

/// Run-scoped accumulator threaded through the capture loop and handed to
/// the exit policy; never ambient state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub created_baselines: u32,
}
