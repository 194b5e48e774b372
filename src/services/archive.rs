use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub(crate) enum ArchiveError {
    #[error("archive io error: {0}")]
    Io(#[from] io::Error),
    #[error("archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Zips every regular file directly inside `folder` into `{parent}/{folder_name}.zip`.
pub(crate) async fn archive_folder(folder: &Path) -> Result<PathBuf, ArchiveError> {
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || write_archive(&folder)).await?
}

fn write_archive(folder: &Path) -> Result<PathBuf, ArchiveError> {
    let folder_name = folder.file_name().map(|name| name.to_string_lossy().into_owned()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "batch folder has no name")
    })?;
    let archive_path = folder
        .parent()
        .map(|parent| parent.join(format!("{folder_name}.zip")))
        .unwrap_or_else(|| PathBuf::from(format!("{folder_name}.zip")));
    let mut entries: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let mut writer = ZipWriter::new(File::create(&archive_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in entries {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            continue;
        };
        writer.start_file(name, options)?;
        let mut source = File::open(&path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(archive_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use std::io::Read;

    #[tokio::test]
    async fn archive_contains_every_batch_file() {
        let root = test_support::scratch_dir("archive");
        let folder = root.join("report_EX01_20250102_102030");
        std::fs::create_dir_all(&folder).expect("folder");
        std::fs::write(folder.join("a.pdf"), b"alpha").expect("write a");
        std::fs::write(folder.join("b.pdf"), b"beta").expect("write b");

        let archive_path = archive_folder(&folder).await.expect("archive");
        assert_eq!(archive_path, root.join("report_EX01_20250102_102030.zip"));

        let mut archive =
            zip::ZipArchive::new(File::open(&archive_path).expect("open")).expect("zip");
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive.by_name("b.pdf").expect("entry").read_to_string(&mut contents).expect("read");
        assert_eq!(contents, "beta");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn empty_folder_still_yields_archive() {
        let root = test_support::scratch_dir("archive-empty");
        let folder = root.join("report_EX02_20250102_102030");
        std::fs::create_dir_all(&folder).expect("folder");

        let archive_path = archive_folder(&folder).await.expect("archive");
        assert!(archive_path.is_file());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_folder_is_an_error() {
        let root = test_support::scratch_dir("archive-missing");
        let result = archive_folder(&root.join("absent")).await;
        assert!(matches!(result, Err(ArchiveError::Io(_))));
        let _ = std::fs::remove_dir_all(root);
    }
}
