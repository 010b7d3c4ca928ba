//! Memory-mapped JSON readers.

use crate::{Error, Result};
use catrack_core::{Event, ModelStore, PipelineConfig, WireGeometry};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without copying the whole file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file contents as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for non UTF-8 content.
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes())
            .map_err(|e| Error::InvalidFormat(format!("{}: {e}", self.path.display())))
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads events from a JSON file.
///
/// Accepts either a JSON array of events or a stream of event objects
/// (e.g. one per line).
///
/// # Errors
/// Returns an error if the file cannot be read or does not hold events.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let reader = MappedFileReader::open(path)?;
    let bytes = reader.as_bytes();
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());

    let events = if first == Some(&b'[') {
        serde_json::from_slice(bytes)?
    } else {
        serde_json::Deserializer::from_slice(bytes)
            .into_iter::<Event>()
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    log::debug!(
        "read {} events from {}",
        events.len(),
        reader.path().display()
    );
    Ok(events)
}

/// Reads and validates a geometry table.
///
/// # Errors
/// Returns an error if the file cannot be read or the table is invalid.
pub fn read_geometry<P: AsRef<Path>>(path: P) -> Result<WireGeometry> {
    let reader = MappedFileReader::open(path)?;
    Ok(WireGeometry::from_slice(reader.as_bytes())?)
}

/// Reads a pipeline configuration. Missing values keep their defaults;
/// ranges are checked later by the track finder.
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let reader = MappedFileReader::open(path)?;
    Ok(serde_json::from_slice(reader.as_bytes())?)
}

/// Loads every `*.json` file of a directory as a classifier model named by
/// its file stem.
///
/// # Errors
/// Returns an error if the directory cannot be listed or a model is invalid.
pub fn read_models<P: AsRef<Path>>(dir: P) -> Result<ModelStore> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<_>>()?;
    paths.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut store = ModelStore::new();
    for path in &paths {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| Error::InvalidFormat(format!("bad model name: {}", path.display())))?;
        let reader = MappedFileReader::open(path)?;
        store.insert_json(name, reader.as_str()?)?;
    }
    log::info!(
        "loaded {} models from {}",
        store.len(),
        dir.as_ref().display()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_mapped_reader() {
        let file = file_with("{}");
        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.as_str().unwrap(), "{}");
        assert_eq!(reader.path(), file.path());
    }

    #[test]
    fn test_events_array_and_lines() {
        let array = file_with(
            r#"[{"id": 1, "hits": [{"layer": 0, "channel": 3}]}, {"id": 2, "hits": []}]"#,
        );
        let events = read_events(array.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].hits[0].channel, 3);

        let lines = file_with("{\"id\": 7, \"hits\": []}\n{\"id\": 8, \"hits\": []}\n");
        let ids: Vec<u64> = read_events(lines.path())
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_malformed_events() {
        let file = file_with(r#"{"id": "x"}"#);
        assert!(matches!(read_events(file.path()), Err(Error::Json(_))));
    }

    #[test]
    fn test_config_overrides() {
        let file = file_with(r#"{"ckf": {"beam_width": 2}}"#);
        let config = read_config(file.path()).unwrap();
        assert_eq!(config.ckf.beam_width, 2);
        assert_eq!(config.facets, PipelineConfig::default().facets);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_geometry("/nonexistent/geometry.json"),
            Err(Error::Io(_))
        ));
    }
}
