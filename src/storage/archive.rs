//! Distribution archive
//!
//! Packs the project tree into `<dist>/<name>.zip`. The archive is written to
//! `<name>.zip.tmp` first and renamed into place; any failure removes the
//! partial file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write archive {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Which files under the root go into the archive
#[derive(Debug, Clone)]
pub struct FileSet {
    root: PathBuf,
    exclude: Vec<Pattern>,
}

impl FileSet {
    pub fn new(root: impl Into<PathBuf>, exclude: &[String]) -> Result<Self, ArchiveError> {
        let exclude = exclude
            .iter()
            .map(|pattern| {
                Pattern::new(pattern.trim_end_matches('/')).map_err(|source| ArchiveError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            exclude,
        })
    }

    /// True when `relative` or one of its ancestors matches an exclude pattern
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| {
                let text = entry_name(p);
                self.exclude.iter().any(|pattern| pattern.matches(&text))
            })
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        !hidden && !self.is_excluded(relative)
    }

    /// Files to pack, as paths relative to the root, sorted
    pub fn files(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.keep(entry));

        for entry in walker {
            let entry = entry.map_err(|source| ArchiveError::Walk {
                path: source.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
                source,
            })?;
            if entry.file_type().is_file() {
                if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                    files.push(relative.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Entry name with `/` separators
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Summary of a written archive
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArchiveReport {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Writes `files` into the archive at `dest`
pub fn write_archive(files: &FileSet, dest: &Path) -> Result<ArchiveReport, ArchiveError> {
    let entries = files.files()?;
    let tmp = temp_path(dest);

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| ArchiveError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let result = write_entries(&files.root, &entries, &tmp).and_then(|_| {
        fs::rename(&tmp, dest).map_err(|source| ArchiveError::Write {
            path: dest.to_path_buf(),
            source,
        })
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    let bytes = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
    Ok(ArchiveReport {
        path: dest.to_path_buf(),
        entries: entries.len(),
        bytes,
    })
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

fn write_entries(root: &Path, entries: &[PathBuf], tmp: &Path) -> Result<(), ArchiveError> {
    let write_err = |source| ArchiveError::Write {
        path: tmp.to_path_buf(),
        source,
    };
    let zip_err = |source| ArchiveError::Zip {
        path: tmp.to_path_buf(),
        source,
    };

    let file = File::create(tmp).map_err(write_err)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in entries {
        let path = root.join(relative);
        let content = fs::read(&path).map_err(|source| ArchiveError::Read {
            path: path.clone(),
            source,
        })?;
        zip.start_file(entry_name(relative), options).map_err(zip_err)?;
        zip.write_all(&content).map_err(write_err)?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}
