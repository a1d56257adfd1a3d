//! 持久化：把最终数据集与代码 / 输出日志交给外部存储，返回持久引用（路径或 URL）

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::core::PersistError;
use crate::sandbox::DatasetHandle;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// 返回数据集的持久引用
    async fn persist(
        &self,
        run_id: Uuid,
        dataset: &DatasetHandle,
        logs: &[PathBuf],
    ) -> Result<String, PersistError>;
}

/// 本地目录存储：`<root>/<run_id>/<stem>_<yyyymmdd_hhmmss>.<ext>`，日志文件放在同一目录
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalDirStore {
    async fn persist(
        &self,
        run_id: Uuid,
        dataset: &DatasetHandle,
        logs: &[PathBuf],
    ) -> Result<String, PersistError> {
        if !dataset.path.is_file() {
            return Err(PersistError::Missing(dataset.path.display().to_string()));
        }
        let dir = self.root.join(run_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let stem = dataset
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let name = match dataset.path.extension() {
            Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
            None => format!("{}_{}", stem, stamp),
        };
        let target = dir.join(name);
        tokio::fs::copy(&dataset.path, &target).await?;

        for log in logs {
            let Some(file_name) = log.file_name() else {
                continue;
            };
            if !log.is_file() {
                return Err(PersistError::Missing(log.display().to_string()));
            }
            tokio::fs::copy(log, dir.join(file_name)).await?;
        }

        tracing::info!(run_id = %run_id, path = %target.display(), "artifacts persisted");
        Ok(target.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_copies_dataset_and_logs() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let data = src.path().join("book.csv");
        std::fs::write(&data, "a,b\n1,2\n").unwrap();
        let log = src.path().join("code.txt");
        std::fs::write(&log, "print(1)").unwrap();

        let store = LocalDirStore::new(out.path());
        let run_id = Uuid::new_v4();
        let handle = DatasetHandle {
            path: data,
            relative: "data/book.csv".to_string(),
        };
        let reference = store.persist(run_id, &handle, &[log]).await.unwrap();

        let path = PathBuf::from(&reference);
        assert!(path.starts_with(out.path().join(run_id.to_string())));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("book_"));
        assert_eq!(path.extension().unwrap(), "csv");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
        assert!(out.path().join(run_id.to_string()).join("code.txt").is_file());
    }

    #[tokio::test]
    async fn test_missing_dataset_is_error() {
        let out = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(out.path());
        let handle = DatasetHandle {
            path: out.path().join("gone.xlsx"),
            relative: "data/gone.xlsx".to_string(),
        };
        let err = store.persist(Uuid::new_v4(), &handle, &[]).await.unwrap_err();
        assert!(matches!(err, PersistError::Missing(_)));
    }
}
