use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, TrialGraphError};

/// A study record found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the source folder, used as the ledger key
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Lowercased, without the dot
    pub extension: String,
}

impl SourceFile {
    /// Describe a single file given on the command line.
    ///
    /// Both paths are canonicalized first, so a file under `root` gets the same
    /// ledger key as from [`discover_sources`] however either path was spelled.
    /// Files outside `root` keep the path as given.
    pub fn from_path(root: &Path, path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TrialGraphError::Config(format!(
                "Source is not a file: {}",
                path.display()
            )));
        }
        let absolute_path = path.canonicalize()?;
        let relative_path = root
            .canonicalize()
            .ok()
            .and_then(|root| {
                absolute_path
                    .strip_prefix(&root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self {
            relative_path,
            extension: extension_of(&absolute_path),
            absolute_path,
        })
    }

    /// File name of the source, e.g. `NCT00000102.xml`
    pub fn file_name(&self) -> String {
        self.absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.relative_path.clone())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Recursively find `.xml` and `.json` records under `root`, ordered by path.
pub fn discover_sources(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let extension = extension_of(path);
        if !matches!(extension.as_str(), "xml" | "json") {
            continue;
        }

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                TrialGraphError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .to_string();

        files.push(SourceFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            extension,
        });
    }

    log::info!("Discovered {} study records in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_sources() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("batch2")).unwrap();
        fs::write(root.join("NCT02.xml"), "<clinical_study/>").unwrap();
        fs::write(root.join("NCT01.XML"), "<clinical_study/>").unwrap();
        fs::write(root.join("batch2/NCT03.json"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "not a record").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();

        let files = discover_sources(root).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();

        assert_eq!(files.len(), 3);
        assert_eq!(paths[0], "NCT01.XML");
        assert_eq!(paths[1], "NCT02.xml");
        assert!(paths[2].ends_with("NCT03.json"));
        assert_eq!(files[0].extension, "xml");
        assert_eq!(files[2].file_name(), "NCT03.json");
    }

    #[test]
    fn test_discover_sources_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_sources(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("NCT09.xml");
        fs::write(&path, "<clinical_study/>").unwrap();

        let file = SourceFile::from_path(temp_dir.path(), &path).unwrap();
        assert_eq!(file.relative_path, "NCT09.xml");
        assert_eq!(file.extension, "xml");

        let missing = SourceFile::from_path(temp_dir.path(), &temp_dir.path().join("nope.xml"));
        assert!(matches!(missing, Err(TrialGraphError::Config(_))));
    }

    #[test]
    fn test_from_path_key_matches_discovery() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("batch/sub")).unwrap();
        fs::write(root.join("batch/NCT05.xml"), "<clinical_study/>").unwrap();

        let discovered = discover_sources(&root.join("batch")).unwrap();
        assert_eq!(discovered[0].relative_path, "NCT05.xml");

        // same root and file, spelled differently on each side
        let spelled_root = root.join("batch").join("sub").join("..");
        let spelled_file = root.join("batch").join("sub").join("..").join("NCT05.xml");
        let file = SourceFile::from_path(&spelled_root, &spelled_file).unwrap();
        assert_eq!(file.relative_path, discovered[0].relative_path);

        let file = SourceFile::from_path(&root.join("batch"), &spelled_file).unwrap();
        assert_eq!(file.relative_path, "NCT05.xml");
        assert_eq!(file.file_name(), "NCT05.xml");
    }
}
