//! Artifact persistence: the output directory for generated code and tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;

use crate::error::PipelineError;

/// File names for one run. The test file imports the code by `module`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub module: String,
    pub app_file: String,
    pub test_file: String,
}

/// Per-process run counter; separates runs started in the same millisecond.
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

impl ArtifactNames {
    /// `generated_app_<YYYYmmdd_HHMMSS_mmm>_<seq>.py` and its `test_` companion.
    pub fn timestamped(now: DateTime<Local>, seq: u64) -> Self {
        Self::for_module(format!(
            "generated_app_{}_{seq}",
            now.format("%Y%m%d_%H%M%S_%3f")
        ))
    }

    /// Names for a new run, unique within this process.
    pub fn next() -> Self {
        Self::timestamped(Local::now(), RUN_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    pub fn for_module(module: impl Into<String>) -> Self {
        let module = module.into();
        Self {
            app_file: format!("{module}.py"),
            test_file: format!("test_{module}.py"),
            module,
        }
    }
}

/// Directory that owns a run's artifacts.
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub async fn create(root: &Path) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PipelineError::Persist {
                path: root.to_path_buf(),
                source,
            })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write (or overwrite) `name` relative to the root. Returns the full path.
    pub async fn write_file(&self, name: &str, content: &str) -> Result<PathBuf, PipelineError> {
        let full = self.path(name);
        tokio::fs::write(&full, content)
            .await
            .map_err(|source| PipelineError::Persist {
                path: full.clone(),
                source,
            })?;
        tracing::info!(path = %full.display(), bytes = content.len(), "wrote artifact");
        Ok(full)
    }

    /// Write `name`, failing if it already exists. A run's first write of an
    /// artifact goes through here so two runs can never share a file.
    pub async fn write_new(&self, name: &str, content: &str) -> Result<PathBuf, PipelineError> {
        let full = self.path(name);
        let persist = |source| PipelineError::Persist {
            path: full.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(persist)?;
        file.write_all(content.as_bytes()).await.map_err(persist)?;
        file.flush().await.map_err(persist)?;
        tracing::info!(path = %full.display(), bytes = content.len(), "created artifact");
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_share_module_identity() {
        let now = Local.with_ymd_and_hms(2025, 12, 1, 12, 58, 57).unwrap()
            + chrono::Duration::milliseconds(42);
        let names = ArtifactNames::timestamped(now, 7);
        assert_eq!(names.module, "generated_app_20251201_125857_042_7");
        assert_eq!(names.app_file, "generated_app_20251201_125857_042_7.py");
        assert_eq!(names.test_file, "test_generated_app_20251201_125857_042_7.py");
    }

    #[test]
    fn next_names_are_distinct_identifiers() {
        let a = ArtifactNames::next();
        let b = ArtifactNames::next();
        assert_ne!(a.module, b.module);
        for name in [&a.module, &b.module] {
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'), "{name}");
        }
    }

    #[tokio::test]
    async fn write_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("generated")).await.unwrap();

        let path = ws.write_file("app.py", "v1").await.unwrap();
        assert!(path.ends_with("generated/app.py"));
        ws.write_file("app.py", "v2").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2");
    }

    #[tokio::test]
    async fn write_new_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).await.unwrap();

        let path = ws.write_new("app.py", "first").await.unwrap();
        let err = ws.write_new("app.py", "second").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Persist { ref source, .. }
                if source.kind() == std::io::ErrorKind::AlreadyExists
        ));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first");
    }
}
