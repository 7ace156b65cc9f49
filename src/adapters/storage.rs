use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 相對路徑轉成 base 目錄下的完整路徑；`..` 與根目錄成分會被忽略
    pub fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.base_path.clone();
        for component in Path::new(path).components() {
            if let Component::Normal(part) = component {
                full.push(part);
            }
        }
        full
    }
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<PathBuf> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        Ok(full_path)
    }
}

/// 清理外部來源的檔名（email、附件名稱），避免產生子目錄
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "unnamed".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_nested_file() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        let written = storage
            .write_file("jane@example.com/scan.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        assert_eq!(written, dir.path().join("jane@example.com").join("scan.pdf"));
        assert_eq!(std::fs::read(written).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_full_path_ignores_parent_components() {
        let storage = LocalStorage::new("/data");
        assert_eq!(storage.full_path("../../etc/passwd"), PathBuf::from("/data/etc/passwd"));
        assert_eq!(storage.full_path("/abs/file"), PathBuf::from("/data/abs/file"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report 2024.pdf"), "report 2024.pdf");
        assert_eq!(sanitize_file_name("a/b\\c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_file_name(".."), "unnamed");
        assert_eq!(sanitize_file_name("  "), "unnamed");
    }
}
