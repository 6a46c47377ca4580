//! Run-wide context passed explicitly to every operation.

use std::path::Path;

use uuid::Uuid;

use crate::error::Result;
use crate::sandbox::BaseDirectory;

/// Immutable state shared by every step of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    base: BaseDirectory,
    dry_run: bool,
    run_id: Uuid,
}

impl RunContext {
    pub fn new(base: BaseDirectory, dry_run: bool) -> Self {
        Self {
            base,
            dry_run,
            run_id: Uuid::new_v4(),
        }
    }

    /// Prepare the base directory and build a context over it.
    pub fn prepare(base_dir: impl AsRef<Path>, dry_run: bool) -> Result<Self> {
        Ok(Self::new(BaseDirectory::prepare(base_dir, dry_run)?, dry_run))
    }

    pub fn base(&self) -> &BaseDirectory {
        &self.base
    }

    pub fn base_path(&self) -> &Path {
        self.base.path()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}
