use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use crate::shared::constants::{DETECTOR_MODEL_NAME, DETECTOR_SEARCH_PATHS};

#[derive(Error, Debug)]
pub enum DetectorResourceError {
    #[error("face detector model not found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("failed to load face detector model {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Default model search list: system install locations, then the user cache.
///
/// - Linux: `$XDG_CACHE_HOME/facecam/models/` or `~/.cache/facecam/models/`
/// - macOS: `~/Library/Caches/facecam/models/`
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = DETECTOR_SEARCH_PATHS.iter().map(PathBuf::from).collect();
    if let Some(dir) = model_cache_dir() {
        paths.push(dir.join(DETECTOR_MODEL_NAME));
    }
    paths
}

pub fn model_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("facecam").join("models"))
}

/// First entry of `search_paths` that is an existing regular file.
pub fn resolve(search_paths: &[PathBuf]) -> Result<PathBuf, DetectorResourceError> {
    search_paths
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| DetectorResourceError::NotFound {
            searched: search_paths.to_vec(),
        })
}

/// Resolves the model and builds a detector from it.
pub fn load_detector(
    search_paths: &[PathBuf],
    params: &DetectionParams,
) -> Result<OnnxBlazefaceDetector, DetectorResourceError> {
    let path = resolve(search_paths)?;
    log::info!("Loading face detector from {}", path.display());
    open_model(&path, params)
}

fn open_model(
    path: &Path,
    params: &DetectionParams,
) -> Result<OnnxBlazefaceDetector, DetectorResourceError> {
    OnnxBlazefaceDetector::new(path, params).map_err(|e| DetectorResourceError::Invalid {
        path: path.to_path_buf(),
        source: e.to_string().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn search_list(dir: &Path) -> Vec<PathBuf> {
        vec![
            dir.join("first").join(DETECTOR_MODEL_NAME),
            dir.join("second").join(DETECTOR_MODEL_NAME),
            dir.join("third").join(DETECTOR_MODEL_NAME),
        ]
    }

    #[test]
    fn test_resolve_uses_only_existing_path() {
        let tmp = TempDir::new().unwrap();
        let paths = search_list(tmp.path());
        fs::create_dir_all(paths[2].parent().unwrap()).unwrap();
        fs::write(&paths[2], b"model").unwrap();

        assert_eq!(resolve(&paths).unwrap(), paths[2]);
    }

    #[test]
    fn test_resolve_prefers_earlier_entries() {
        let tmp = TempDir::new().unwrap();
        let paths = search_list(tmp.path());
        for p in &paths[1..] {
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, b"model").unwrap();
        }

        assert_eq!(resolve(&paths).unwrap(), paths[1]);
    }

    #[test]
    fn test_resolve_none_existing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let paths = search_list(tmp.path());

        match resolve(&paths) {
            Err(DetectorResourceError::NotFound { searched }) => assert_eq!(searched, paths),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_skips_directories() {
        let tmp = TempDir::new().unwrap();
        let paths = search_list(tmp.path());
        fs::create_dir_all(&paths[0]).unwrap();

        assert!(matches!(
            resolve(&paths),
            Err(DetectorResourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_not_found_message_lists_searched_paths() {
        let err = DetectorResourceError::NotFound {
            searched: vec![PathBuf::from("/a/m.onnx"), PathBuf::from("/b/m.onnx")],
        };
        let message = err.to_string();
        assert!(message.contains("/a/m.onnx, /b/m.onnx"));
    }

    #[test]
    fn test_load_detector_rejects_corrupt_model() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DETECTOR_MODEL_NAME);
        fs::write(&path, b"definitely not an onnx graph").unwrap();

        match load_detector(&[path.clone()], &DetectionParams::default()) {
            Err(DetectorResourceError::Invalid { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("expected Invalid, got {other}"),
            Ok(_) => panic!("corrupt model loaded"),
        }
    }

    #[test]
    fn test_default_search_paths_end_with_user_cache() {
        let paths = default_search_paths();
        assert_eq!(paths[0], PathBuf::from(DETECTOR_SEARCH_PATHS[0]));
        if let Some(last) = paths.last() {
            assert!(last.ends_with(DETECTOR_MODEL_NAME));
        }
        if model_cache_dir().is_some() {
            assert_eq!(paths.len(), DETECTOR_SEARCH_PATHS.len() + 1);
            assert!(paths.last().unwrap().to_string_lossy().contains("facecam"));
        }
    }
}
