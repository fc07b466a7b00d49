use anyhow::Result;
use log::{error, info};
use std::path::Path;
use tokio::fs;

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    if let Err(e) = fs::create_dir_all(path).await {
        error!("Failed to create directory at {:?}: {}", path, e);
        return Err(e.into());
    }
    info!("Created directory at: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_nested_directories_once() {
        let root = std::env::temp_dir().join(format!("bracelet-link-utils-{}", std::process::id()));
        let nested = root.join("a").join("b");

        ensure_directory_exists(&nested).await.unwrap();
        assert!(nested.is_dir());
        // second call is a no-op
        ensure_directory_exists(&nested).await.unwrap();

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn empty_path_is_accepted() {
        ensure_directory_exists("").await.unwrap();
    }
}
