use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use harvest_logging::harvest_info;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::ExtractedItem;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot write into {}: {source}", .path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("records could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Make sure downloads can land in `dir`, creating it and its parents if needed.
pub fn ensure_output_dir(dir: &Path) -> Result<(), OutputError> {
    let unwritable = |source| OutputError::Unwritable {
        path: dir.to_path_buf(),
        source,
    };
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => return Err(OutputError::NotADirectory(dir.to_path_buf())),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(unwritable)?;
            harvest_info!("Created output directory {}", dir.display());
        }
        Err(err) => return Err(unwritable(err)),
    }
    // The probe file is deleted when dropped.
    NamedTempFile::new_in(dir).map_err(unwritable)?;
    Ok(())
}

/// Write `content` to `{dir}/{filename}` through a sibling temp file, then rename.
///
/// An existing file is replaced only once the new content is on disk.
pub fn write_atomically(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf, OutputError> {
    ensure_output_dir(dir)?;
    let target = dir.join(filename);
    let unwritable = |source| OutputError::Unwritable {
        path: target.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(unwritable)?;
    tmp.write_all(content).map_err(unwritable)?;
    tmp.as_file().sync_all().map_err(unwritable)?;
    tmp.persist(&target).map_err(|err| unwritable(err.error))?;
    Ok(target)
}

/// Receives extracted records in document order.
pub trait RecordSink {
    fn emit(&mut self, index: usize, item: &ExtractedItem);
}

/// Logs one line per record: `Link 1: Sample Image 1 - https://example.com/image1.jpg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecordSink;

impl RecordSink for LogRecordSink {
    fn emit(&mut self, index: usize, item: &ExtractedItem) {
        harvest_info!("Link {}: {} - {}", index + 1, item.label, item.href);
    }
}

/// Keeps every record for the caller.
#[derive(Debug, Default, Clone)]
pub struct CollectingRecordSink {
    items: Vec<ExtractedItem>,
}

impl CollectingRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ExtractedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ExtractedItem> {
        self.items
    }
}

impl RecordSink for CollectingRecordSink {
    fn emit(&mut self, _index: usize, item: &ExtractedItem) {
        self.items.push(item.clone());
    }
}

/// Writes `items` to `{dir}/{filename}` as a pretty-printed JSON array.
pub fn write_records_json(
    dir: &Path,
    filename: &str,
    items: &[ExtractedItem],
) -> Result<PathBuf, OutputError> {
    let json = serde_json::to_vec_pretty(items)?;
    let path = write_atomically(dir, filename, &json)?;
    harvest_info!("Wrote {} records to {}", items.len(), path.display());
    Ok(path)
}
