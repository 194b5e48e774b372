use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// A file written into a batch folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredFile {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: String,
}

/// Folder owned by one upload batch under the upload root.
#[derive(Debug)]
pub(crate) struct BatchFolder {
    name: String,
    path: PathBuf,
    used_names: HashSet<String>,
}

impl BatchFolder {
    /// Creates `report_{exam_code}_{stamp}`, suffixing `_2`, `_3`, ... when taken.
    pub(crate) async fn create(root: &Path, exam_code: &str, stamp: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let base = format!("report_{}_{}", sanitized_component(exam_code, "exam"), stamp);
        let mut attempt = 1_u32;
        loop {
            let name = if attempt == 1 { base.clone() } else { format!("{base}_{attempt}") };
            let path = root.join(&name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(Self { name, path, used_names: HashSet::new() }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn write_file(&mut self, filename: &str, bytes: &[u8]) -> io::Result<StoredFile> {
        let name = self.claim_name(filename);
        let path = self.path.join(&name);
        tokio::fs::write(&path, bytes).await?;

        let (size_bytes, sha256) = file_digest(bytes);
        Ok(StoredFile { name, path, size_bytes, sha256 })
    }

    fn claim_name(&mut self, filename: &str) -> String {
        let sanitized = sanitized_component(base_name(filename), "report.pdf");
        let (stem, extension) = match sanitized.rfind('.') {
            Some(index) if index > 0 => sanitized.split_at(index),
            _ => (sanitized.as_str(), ""),
        };

        let mut candidate = sanitized.clone();
        let mut counter = 1_u32;
        while self.used_names.contains(&candidate.to_ascii_lowercase()) {
            counter += 1;
            candidate = format!("{stem}_{counter}{extension}");
        }

        self.used_names.insert(candidate.to_ascii_lowercase());
        candidate
    }
}

pub(crate) fn file_digest(bytes: &[u8]) -> (i64, String) {
    (bytes.len() as i64, hex::encode(Sha256::digest(bytes)))
}

fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

fn sanitized_component(name: &str, fallback: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        fallback.to_string()
    } else {
        sanitized.to_string()
    }
}
