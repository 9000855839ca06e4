//! Lifecycle tracking for files written by the pipeline.
//!
//! Every stage registers the files it creates with an [`ArtifactManager`].
//! When the manager is cleaned up (explicitly or on drop) every artifact that
//! was not marked as retained is deleted, so a run leaves behind only its
//! designated outputs no matter how it ended.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pipeline stage that produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    /// Raw elevation raster as downloaded.
    Dem,
    /// Elevation raster reprojected to the working CRS.
    Reprojected,
    /// Elevation raster resampled to a fixed resolution.
    Resampled,
    /// Slope raster.
    Slope,
    /// Terminal vector dataset.
    Vector,
}

impl StageTag {
    /// Suffix used when naming files written by this stage.
    pub fn suffix(&self) -> &'static str {
        match self {
            StageTag::Dem => "dem",
            StageTag::Reprojected => "reproj",
            StageTag::Resampled => "resampled",
            StageTag::Slope | StageTag::Vector => "slope",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageTag::Dem => "dem",
            StageTag::Reprojected => "reprojected",
            StageTag::Resampled => "resampled",
            StageTag::Slope => "slope",
            StageTag::Vector => "vector",
        };
        f.write_str(name)
    }
}

/// A file owned by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Stage that wrote the file.
    pub stage: StageTag,
    /// Retained artifacts survive cleanup.
    pub retained: bool,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files that were deleted.
    pub removed: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// True when every non-retained artifact is gone.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns every file written during a pipeline run.
///
/// Cleanup runs on [`Drop`], which covers normal returns, `?` early returns
/// and panics unwinding through the owner.
#[derive(Debug, Default)]
pub struct ArtifactManager {
    artifacts: Vec<PipelineArtifact>,
}

impl ArtifactManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a file path.
    ///
    /// Registering the same path twice keeps the first record (and its
    /// retained flag).
    pub fn register<P: Into<PathBuf>>(&mut self, path: P, stage: StageTag) -> &Path {
        let path = path.into();
        let index = match self.artifacts.iter().position(|a| a.path == path) {
            Some(index) => index,
            None => {
                debug!(path = %path.display(), %stage, "Registered artifact");
                self.artifacts.push(PipelineArtifact {
                    path,
                    stage,
                    retained: false,
                });
                self.artifacts.len() - 1
            }
        };
        &self.artifacts[index].path
    }

    /// Register a path and create (truncate) the file in one step.
    ///
    /// The path is registered before the file is opened, so a partially
    /// created file is still cleaned up.
    pub fn create_file<P: Into<PathBuf>>(&mut self, path: P, stage: StageTag) -> io::Result<File> {
        let path = self.register(path, stage).to_path_buf();
        File::create(path)
    }

    /// Mark a registered artifact as a final output.
    ///
    /// Returns `false` if the path was never registered.
    pub fn retain(&mut self, path: &Path) -> bool {
        match self.artifacts.iter_mut().find(|a| a.path == path) {
            Some(artifact) => {
                artifact.retained = true;
                true
            }
            None => false,
        }
    }

    /// All artifacts currently owned.
    pub fn artifacts(&self) -> &[PipelineArtifact] {
        &self.artifacts
    }

    /// Paths of the artifacts that will survive cleanup.
    pub fn retained_paths(&self) -> Vec<PathBuf> {
        self.artifacts
            .iter()
            .filter(|a| a.retained)
            .map(|a| a.path.clone())
            .collect()
    }

    /// Delete every non-retained artifact.
    ///
    /// Deleted entries are forgotten, so calling this again is a no-op for
    /// them. Files that were never created are skipped silently.
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut kept = Vec::with_capacity(self.artifacts.len());

        for artifact in self.artifacts.drain(..) {
            if artifact.retained {
                kept.push(artifact);
                continue;
            }
            match fs::remove_file(&artifact.path) {
                Ok(()) => {
                    debug!(path = %artifact.path.display(), stage = %artifact.stage, "Removed temporary file");
                    report.removed.push(artifact.path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %artifact.path.display(), error = %e, "Failed to remove temporary file");
                    report.failed.push((artifact.path, e.to_string()));
                }
            }
        }

        self.artifacts = kept;
        report
    }
}

impl Drop for ArtifactManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_register_is_idempotent() {
        let mut manager = ArtifactManager::new();
        manager.register("a.tif", StageTag::Dem);
        manager.retain(Path::new("a.tif"));
        manager.register("a.tif", StageTag::Slope);

        assert_eq!(manager.artifacts().len(), 1);
        assert!(manager.artifacts()[0].retained);
        assert_eq!(manager.artifacts()[0].stage, StageTag::Dem);
    }

    #[test]
    fn test_retain_unknown_path() {
        let mut manager = ArtifactManager::new();
        assert!(!manager.retain(Path::new("missing.tif")));
    }

    #[test]
    fn test_cleanup_skips_retained_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("temp.tif");
        let keep = dir.path().join("keep.geojson");
        let never_written = dir.path().join("never.tif");

        let mut manager = ArtifactManager::new();
        manager.create_file(&temp, StageTag::Slope).unwrap().write_all(b"x").unwrap();
        manager.create_file(&keep, StageTag::Vector).unwrap().write_all(b"{}").unwrap();
        manager.register(&never_written, StageTag::Resampled);
        manager.retain(&keep);

        let report = manager.cleanup();
        assert!(report.is_clean());
        assert_eq!(report.removed, vec![temp.clone()]);
        assert!(!temp.exists());
        assert!(keep.exists());
        assert_eq!(manager.retained_paths(), vec![keep]);

        // Second pass has nothing left to do.
        assert_eq!(manager.cleanup(), CleanupReport::default());
    }

    #[test]
    fn test_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("dropped.tif");
        {
            let mut manager = ArtifactManager::new();
            manager.create_file(&temp, StageTag::Dem).unwrap();
            assert!(temp.exists());
        }
        assert!(!temp.exists());
    }

    #[test]
    fn test_stage_suffixes() {
        assert_eq!(StageTag::Dem.suffix(), "dem");
        assert_eq!(StageTag::Reprojected.suffix(), "reproj");
        assert_eq!(StageTag::Resampled.suffix(), "resampled");
        assert_eq!(StageTag::Slope.suffix(), "slope");
        assert_eq!(StageTag::Vector.to_string(), "vector");
    }
}
