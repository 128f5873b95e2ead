//! Filesystem writes for generated config.

use std::io;
use std::path::Path;

/// Write `content` to `path`, creating parent directories.
pub async fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Write a file readable only by its owner.
pub async fn write_private(path: &Path, content: &str) -> io::Result<()> {
    write_file(path, content).await?;
    set_owner_only(path).await
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Remove a file; a missing file is not an error.
pub async fn remove_file(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a directory tree; a missing directory is not an error.
pub async fn remove_dir(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Point `link` at `target`, replacing whatever `link` was.
#[cfg(unix)]
pub async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    remove_file(link).await?;
    tokio::fs::symlink(target, link).await
}

#[cfg(not(unix))]
pub async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    remove_file(link).await?;
    tokio::fs::copy(target, link).await.map(|_| ())
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
