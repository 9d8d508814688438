#![forbid(unsafe_code)]

use crate::error::SnapshotError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const VIDEO_SNAPSHOT: &str = "video_data.json";
pub const LINK_SNAPSHOT: &str = "link_data.json";
pub const ENRICHED_SNAPSHOT: &str = "enriched_link_data.json";

/// Where each stage's output lives.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub videos: PathBuf,
    pub links: PathBuf,
    pub enriched: PathBuf,
}

impl SnapshotPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            videos: dir.join(VIDEO_SNAPSHOT),
            links: dir.join(LINK_SNAPSHOT),
            enriched: dir.join(ENRICHED_SNAPSHOT),
        }
    }
}

/// Pretty-prints `value` to `path` through a sibling temp file so readers
/// never see a half-written snapshot. Non-ASCII text is written as-is.
pub fn write_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let io_err = |source: std::io::Error| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value).map_err(|source| {
            SnapshotError::Format {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SnapshotError::Format {
        path: path.to_path_buf(),
        source,
    })
}
