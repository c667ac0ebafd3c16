//! Process-wide model registry: load once, keep for the session.
//!
//! Detection may not run until every required artifact is loaded, and a
//! loaded set comes from exactly one source. The registry serializes
//! concurrent load calls so a second caller waits for the first attempt's
//! outcome instead of triggering duplicate downloads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

use thiserror::Error;

use crate::models::source::{ArtifactError, ModelSource};
use crate::shared::constants::{
    AGE_GENDER_MODEL_NAME, DEFAULT_MODEL_DIR, DETECTOR_MODEL_NAME, FALLBACK_MODEL_BASE_URL,
    LANDMARKS_MODEL_NAME,
};
use crate::shared::face::AnnotationDepth;

/// Both sources failed. `cause` is the fallback attempt's underlying error;
/// the primary failure was already logged when the fallback was tried.
#[derive(Error, Debug, Clone)]
#[error("model load failed from primary and fallback sources: {cause}")]
pub struct ModelLoadError {
    pub cause: String,
}

/// Primary and fallback locations for the model set.
#[derive(Clone, Debug)]
pub struct ModelSources {
    pub primary: ModelSource,
    pub fallback: ModelSource,
}

impl Default for ModelSources {
    fn default() -> Self {
        Self {
            primary: ModelSource::Dir(PathBuf::from(DEFAULT_MODEL_DIR)),
            fallback: ModelSource::Http(FALLBACK_MODEL_BASE_URL.to_string()),
        }
    }
}

/// Which optional models to load alongside the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSelection {
    pub landmarks: bool,
    pub attributes: bool,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            landmarks: true,
            attributes: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Primary,
    Fallback,
}

/// A fully resolved model set. Every path exists locally and the whole set
/// came from the same source.
#[derive(Clone, Debug)]
pub struct LoadedModels {
    source: SourceKind,
    detector: PathBuf,
    landmarks: Option<PathBuf>,
    age_gender: Option<PathBuf>,
}

impl LoadedModels {
    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn detector(&self) -> &Path {
        &self.detector
    }

    pub fn landmarks(&self) -> Option<&Path> {
        self.landmarks.as_deref()
    }

    pub fn age_gender(&self) -> Option<&Path> {
        self.age_gender.as_deref()
    }

    /// Annotation depth this set supports.
    pub fn depth(&self) -> AnnotationDepth {
        if self.age_gender.is_some() {
            AnnotationDepth::Full
        } else if self.landmarks.is_some() {
            AnnotationDepth::WithLandmarks
        } else {
            AnnotationDepth::Detection
        }
    }
}

enum LoadSlot {
    Empty,
    InFlight,
    Done(Result<LoadedModels, ModelLoadError>),
}

/// Session-lifetime model registry.
///
/// `load` is idempotent after success: later calls return the cached set
/// without touching either source. A call after a failed attempt starts a
/// fresh attempt (the manual retry path). Models are never unloaded.
pub struct ModelRegistry {
    slot: Mutex<LoadSlot>,
    ready: Condvar,
}

static GLOBAL: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(LoadSlot::Empty),
            ready: Condvar::new(),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> Arc<ModelRegistry> {
        GLOBAL.get_or_init(|| Arc::new(ModelRegistry::new())).clone()
    }

    /// Load the selected model set from the primary source, falling back to
    /// the fallback source on any failure. Fallback success is silent
    /// success: no error surfaces, only a log record.
    pub fn load(
        &self,
        sources: &ModelSources,
        selection: ModelSelection,
    ) -> Result<LoadedModels, ModelLoadError> {
        {
            let mut slot = self.slot.lock().unwrap();
            // Another caller is mid-load: wait for that attempt's outcome
            // rather than starting a duplicate.
            while matches!(*slot, LoadSlot::InFlight) {
                let (guard, _) = self
                    .ready
                    .wait_timeout(slot, Duration::from_millis(100))
                    .unwrap();
                slot = guard;
                if let LoadSlot::Done(ref outcome) = *slot {
                    return outcome.clone();
                }
            }
            if let LoadSlot::Done(Ok(ref models)) = *slot {
                return Ok(models.clone());
            }
            // Empty or previously failed: this caller runs a fresh attempt.
            *slot = LoadSlot::InFlight;
        }

        let outcome = fetch_set(sources, selection);

        let mut slot = self.slot.lock().unwrap();
        *slot = LoadSlot::Done(outcome.clone());
        self.ready.notify_all();
        outcome
    }

    /// True once a load has succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(*self.slot.lock().unwrap(), LoadSlot::Done(Ok(_)))
    }

    /// The loaded set, if ready.
    pub fn loaded(&self) -> Option<LoadedModels> {
        match *self.slot.lock().unwrap() {
            LoadSlot::Done(Ok(ref models)) => Some(models.clone()),
            _ => None,
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fetch_set(
    sources: &ModelSources,
    selection: ModelSelection,
) -> Result<LoadedModels, ModelLoadError> {
    match fetch_from(&sources.primary, SourceKind::Primary, selection) {
        Ok(models) => Ok(models),
        Err(primary_err) => {
            log::warn!("primary model source failed: {primary_err}; retrying from fallback");
            match fetch_from(&sources.fallback, SourceKind::Fallback, selection) {
                Ok(models) => {
                    log::info!("model set loaded from fallback source");
                    Ok(models)
                }
                Err(fallback_err) => Err(ModelLoadError {
                    cause: fallback_err.to_string(),
                }),
            }
        }
    }
}

/// Resolve the whole selected set from one source. Any miss fails the set;
/// partially resolved paths are discarded.
fn fetch_from(
    source: &ModelSource,
    kind: SourceKind,
    selection: ModelSelection,
) -> Result<LoadedModels, ArtifactError> {
    let detector = source.resolve_artifact(DETECTOR_MODEL_NAME)?;
    let landmarks = if selection.landmarks {
        Some(source.resolve_artifact(LANDMARKS_MODEL_NAME)?)
    } else {
        None
    };
    let age_gender = if selection.attributes {
        Some(source.resolve_artifact(AGE_GENDER_MODEL_NAME)?)
    } else {
        None
    };
    Ok(LoadedModels {
        source: kind,
        detector,
        landmarks,
        age_gender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    const ALL_NAMES: [&str; 3] = [
        DETECTOR_MODEL_NAME,
        LANDMARKS_MODEL_NAME,
        AGE_GENDER_MODEL_NAME,
    ];

    fn write_artifacts(dir: &TempDir, names: &[&str]) {
        for name in names {
            fs::write(dir.path().join(name), b"stub model").unwrap();
        }
    }

    fn sources(primary: &TempDir, fallback: &TempDir) -> ModelSources {
        ModelSources {
            primary: ModelSource::Dir(primary.path().to_path_buf()),
            fallback: ModelSource::Dir(fallback.path().to_path_buf()),
        }
    }

    #[test]
    fn test_load_from_primary() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        write_artifacts(&primary, &ALL_NAMES);
        write_artifacts(&fallback, &ALL_NAMES);

        let registry = ModelRegistry::new();
        let models = registry
            .load(&sources(&primary, &fallback), ModelSelection::default())
            .unwrap();

        assert_eq!(models.source(), SourceKind::Primary);
        assert!(models.detector().starts_with(primary.path()));
        assert_eq!(models.depth(), AnnotationDepth::Full);
        assert!(registry.is_ready());
    }

    #[test]
    fn test_fallback_succeeds_silently_when_primary_empty() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        write_artifacts(&fallback, &ALL_NAMES);

        let registry = ModelRegistry::new();
        let models = registry
            .load(&sources(&primary, &fallback), ModelSelection::default())
            .unwrap();

        assert_eq!(models.source(), SourceKind::Fallback);
        assert!(registry.is_ready());
    }

    #[test]
    fn test_no_mixed_sources_on_partial_primary() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        // Primary has the detector but is missing the rest of the set.
        write_artifacts(&primary, &[DETECTOR_MODEL_NAME]);
        write_artifacts(&fallback, &ALL_NAMES);

        let registry = ModelRegistry::new();
        let models = registry
            .load(&sources(&primary, &fallback), ModelSelection::default())
            .unwrap();

        assert_eq!(models.source(), SourceKind::Fallback);
        assert!(models.detector().starts_with(fallback.path()));
        assert!(models.landmarks().unwrap().starts_with(fallback.path()));
    }

    #[test]
    fn test_both_sources_fail_carries_cause() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();

        let registry = ModelRegistry::new();
        let err = registry
            .load(&sources(&primary, &fallback), ModelSelection::default())
            .unwrap_err();

        assert!(err.cause.contains(DETECTOR_MODEL_NAME));
        assert!(!registry.is_ready());
        assert!(registry.loaded().is_none());
    }

    #[test]
    fn test_idempotent_after_success() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        write_artifacts(&primary, &ALL_NAMES);

        let registry = ModelRegistry::new();
        let srcs = sources(&primary, &fallback);
        let first = registry.load(&srcs, ModelSelection::default()).unwrap();

        // Remove the files: a second load must serve the cached set without
        // re-resolving anything.
        for name in ALL_NAMES {
            fs::remove_file(primary.path().join(name)).unwrap();
        }
        let second = registry.load(&srcs, ModelSelection::default()).unwrap();
        assert_eq!(second.detector(), first.detector());
        assert_eq!(second.source(), SourceKind::Primary);
    }

    #[test]
    fn test_retry_after_failure_starts_fresh_attempt() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();

        let registry = ModelRegistry::new();
        let srcs = sources(&primary, &fallback);
        assert!(registry.load(&srcs, ModelSelection::default()).is_err());

        write_artifacts(&primary, &ALL_NAMES);
        let models = registry.load(&srcs, ModelSelection::default()).unwrap();
        assert_eq!(models.source(), SourceKind::Primary);
        assert!(registry.is_ready());
    }

    #[test]
    fn test_concurrent_loads_share_one_outcome() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        write_artifacts(&primary, &ALL_NAMES);

        let registry = Arc::new(ModelRegistry::new());
        let srcs = sources(&primary, &fallback);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let srcs = srcs.clone();
                thread::spawn(move || registry.load(&srcs, ModelSelection::default()))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = results[0].as_ref().unwrap();
        for result in &results {
            let models = result.as_ref().unwrap();
            assert_eq!(models.detector(), first.detector());
            assert_eq!(models.source(), SourceKind::Primary);
        }
    }

    #[test]
    fn test_selection_limits_depth() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        // Only the detector file exists, which suffices for this selection.
        write_artifacts(&primary, &[DETECTOR_MODEL_NAME]);

        let registry = ModelRegistry::new();
        let models = registry
            .load(
                &sources(&primary, &fallback),
                ModelSelection {
                    landmarks: false,
                    attributes: false,
                },
            )
            .unwrap();

        assert_eq!(models.depth(), AnnotationDepth::Detection);
        assert!(models.landmarks().is_none());
        assert!(models.age_gender().is_none());
    }
}
