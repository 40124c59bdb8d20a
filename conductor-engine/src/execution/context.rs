// Run Context
// Per-run state shared by every component of one pipeline run

use crate::cache::CacheStore;
use crate::execution::instance::JobInstance;
use crate::trigger::Event;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything one pipeline run shares: the triggering event, the workspace
/// root under which instances get isolated working directories, and the
/// cache store. Holding this per run (rather than ambient globals) lets
/// overlapping runs coexist without cross-talk.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub pipeline_name: String,
    pub event: Event,
    pub workspace_root: PathBuf,
    pub cache: Arc<CacheStore>,
}

impl RunContext {
    pub fn new(
        pipeline_name: impl Into<String>,
        event: Event,
        workspace_root: impl Into<PathBuf>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            event,
            workspace_root: workspace_root.into(),
            cache,
        }
    }

    /// The isolated working directory for one instance. Instances never
    /// share mutable filesystem state.
    pub fn instance_workdir(&self, instance: &JobInstance) -> PathBuf {
        self.workspace_root.join(instance.workdir_name())
    }

    /// Create an instance's working directory.
    pub fn prepare_workdir(&self, instance: &JobInstance) -> io::Result<PathBuf> {
        let dir = self.instance_workdir(instance);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
