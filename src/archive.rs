//! Tar archive codec used to move files in and out of containers.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tar::{Archive, Builder, EntryType};
use tracing::debug;

use crate::error::{Result, SnapError};

/// A file to place in an archive under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub source_path: PathBuf,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
        }
    }
}

/// Write an uncompressed tar of `entries` to `writer`.
pub fn create_tar<W: Write>(entries: &[ArchiveEntry], writer: W) -> Result<W> {
    let mut builder = Builder::new(writer);
    builder.follow_symlinks(true);
    for entry in entries {
        builder
            .append_path_with_name(&entry.source_path, &entry.name)
            .map_err(|e| {
                SnapError::archive(format!(
                    "Failed to add {:?} as '{}': {}",
                    entry.source_path, entry.name, e
                ))
            })?;
    }
    builder
        .into_inner()
        .map_err(|e| SnapError::archive(format!("Failed to finish archive: {}", e)))
}

/// Write an uncompressed tar of `entries` to a new file at `dest`,
/// replacing any existing file.
pub fn create_tar_file(entries: &[ArchiveEntry], dest: &Path) -> Result<()> {
    debug!("Creating archive {:?} with {} entries", dest, entries.len());
    let file = File::create(dest)?;
    let mut file = create_tar(entries, file)?;
    file.flush()?;
    Ok(())
}

fn normalized_entry_name(raw: &Path) -> String {
    let name = raw.to_string_lossy();
    name.trim_start_matches("./").trim_end_matches('/').to_string()
}

/// Names of all entries in an archive.
pub fn list_entries<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut archive = Archive::new(reader);
    let mut names = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| SnapError::archive(format!("Failed to read archive: {}", e)))?
    {
        let entry = entry.map_err(|e| SnapError::archive(format!("Corrupt entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| SnapError::archive(format!("Invalid entry path: {}", e)))?;
        names.push(normalized_entry_name(&path));
    }
    Ok(names)
}

/// Extract the single regular-file entry whose name matches `name`
/// (case-insensitively) into `dest_dir`, overwriting an existing file.
///
/// Returns the path written, which is `dest_dir/name`.
pub fn extract_entry(archive_path: &Path, name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let candidates: Vec<String> = list_entries(File::open(archive_path)?)?
        .into_iter()
        .filter(|entry| entry.eq_ignore_ascii_case(name))
        .collect();
    match candidates.len() {
        0 => {
            return Err(SnapError::archive(format!(
                "No entry named '{}' in {:?}",
                name, archive_path
            )));
        }
        1 => {}
        n => {
            return Err(SnapError::archive(format!(
                "{} entries named '{}' in {:?}",
                n, name, archive_path
            )));
        }
    }

    let dest = dest_dir.join(name);
    let mut archive = Archive::new(File::open(archive_path)?);
    for entry in archive
        .entries()
        .map_err(|e| SnapError::archive(format!("Failed to read archive: {}", e)))?
    {
        let mut entry = entry.map_err(|e| SnapError::archive(format!("Corrupt entry: {}", e)))?;
        let entry_name = normalized_entry_name(
            &entry
                .path()
                .map_err(|e| SnapError::archive(format!("Invalid entry path: {}", e)))?,
        );
        if !entry_name.eq_ignore_ascii_case(name) {
            continue;
        }

        let kind = entry.header().entry_type();
        if !matches!(kind, EntryType::Regular | EntryType::Continuous) {
            return Err(SnapError::archive(format!(
                "Entry '{}' is not a regular file ({:?})",
                entry_name, kind
            )));
        }

        fs::create_dir_all(dest_dir)?;
        if dest.exists() {
            fs::remove_file(&dest)?;
        }
        entry
            .unpack(&dest)
            .map_err(|e| SnapError::archive(format!("Failed to extract '{}': {}", entry_name, e)))?;
        debug!("Extracted '{}' to {:?}", entry_name, dest);
        return Ok(dest);
    }

    Err(SnapError::archive(format!(
        "Entry '{}' vanished from {:?}",
        name, archive_path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_archive_roundtrip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("orders.bkp");
        fs::write(&source, b"backup bytes").unwrap();
        let archive = dir.path().join("orders.bkp.tar");

        create_tar_file(&[ArchiveEntry::new("orders.bkp", &source)], &archive).unwrap();
        assert_eq!(
            list_entries(File::open(&archive).unwrap()).unwrap(),
            vec!["orders.bkp"]
        );

        let out = dir.path().join("out");
        let written = extract_entry(&archive, "ORDERS.BKP", &out).unwrap();
        assert_eq!(written, out.join("ORDERS.BKP"));
        assert_eq!(fs::read(&written).unwrap(), b"backup bytes");
    }

    #[test]
    fn test_extract_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.bkp");
        fs::write(&source, b"new").unwrap();
        let archive = dir.path().join("a.tar");
        create_tar_file(&[ArchiveEntry::new("a.bkp", &source)], &archive).unwrap();

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.bkp"), b"old contents").unwrap();

        extract_entry(&archive, "a.bkp", &out).unwrap();
        assert_eq!(fs::read(out.join("a.bkp")).unwrap(), b"new");
    }

    #[test]
    fn test_extract_only_requested_entry() {
        let dir = TempDir::new().unwrap();
        let one = dir.path().join("one");
        let two = dir.path().join("two");
        fs::write(&one, b"1").unwrap();
        fs::write(&two, b"2").unwrap();
        let archive = dir.path().join("both.tar");
        create_tar_file(
            &[ArchiveEntry::new("one", &one), ArchiveEntry::new("two", &two)],
            &archive,
        )
        .unwrap();

        let out = dir.path().join("out");
        extract_entry(&archive, "two", &out).unwrap();
        assert!(!out.join("one").exists());
        assert_eq!(fs::read(out.join("two")).unwrap(), b"2");
    }

    #[test]
    fn test_missing_entry() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("x");
        fs::write(&source, b"x").unwrap();
        let archive = dir.path().join("x.tar");
        create_tar_file(&[ArchiveEntry::new("x", &source)], &archive).unwrap();

        let err = extract_entry(&archive, "y", dir.path()).unwrap_err();
        assert!(matches!(err, SnapError::Archive(_)));
    }

    #[test]
    fn test_create_tar_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = create_tar(
            &[ArchiveEntry::new("ghost", dir.path().join("ghost"))],
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SnapError::Archive(_)));
    }
}
