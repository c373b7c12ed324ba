use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs::{create_dir_all, rename, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

pub async fn prepare_io<P: AsRef<Path>>(dirs: &[P]) -> anyhow::Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        create_dir_all(dir)
            .await
            .with_context(|| format!("could not create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Creates `path` only if nothing exists there yet. `Ok(None)` means the path
/// is taken and the caller has to pick another name.
pub async fn create_io_file<P: AsRef<Path>>(path: P) -> std::io::Result<Option<File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(err),
    }
}

pub async fn write_all_to(mut file: File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Reads the whole file, `Ok(None)` when it does not exist.
pub async fn read_io_file<P: AsRef<Path>>(path: P) -> std::io::Result<Option<Vec<u8>>> {
    let file = match File::open(path.as_ref()).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).await?;
    Ok(Some(bytes))
}

/// Writes through a sibling temp file and renames it over `path`.
pub async fn replace_io_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(path);
    let file = File::create(&tmp).await?;
    write_all_to(file, bytes).await?;
    rename(&tmp, path).await
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
