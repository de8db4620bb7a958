use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::models::PriceObservation;
use crate::utils::errors::{RecordError, RenderError};

/// Append observations to the CSV history, creating it with a header if needed.
///
/// All rows are encoded before the file is opened and land in one write,
/// so an encoding failure leaves the file untouched. An existing file must
/// carry the history header; a missing final newline is restored first.
/// Returns the number of rows appended.
pub fn append_observations(
    path: &Path,
    observations: &[PriceObservation],
) -> Result<usize, RecordError> {
    if observations.is_empty() {
        return Ok(0);
    }

    let io_err = |source: std::io::Error| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    // A zero-length file is treated like a missing one
    let needs_header = match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(io_err(e)),
    };

    let prefix = if needs_header {
        Vec::new()
    } else if check_existing(path)? {
        warn!("History {} does not end with a newline, adding one", path.display());
        vec![b'\n']
    } else {
        Vec::new()
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(prefix);
    if needs_header {
        writer.write_record(PriceObservation::HEADER)?;
    }
    for observation in observations {
        writer.serialize(observation)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| RecordError::Csv(csv::Error::from(e.into_error())))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(&buffer).map_err(io_err)?;
    file.sync_data().map_err(io_err)?;

    if needs_header {
        info!("Created history file {}", path.display());
    }
    debug!("Appended {} rows to {}", observations.len(), path.display());

    Ok(observations.len())
}

/// Check that a non-empty history starts with the expected header.
/// Returns whether the last line is missing its terminating newline.
fn check_existing(path: &Path) -> Result<bool, RecordError> {
    let io_err = |source: std::io::Error| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut header = csv::StringRecord::new();
    reader.read_record(&mut header)?;
    if header.iter().ne(PriceObservation::HEADER.iter().copied()) {
        return Err(RecordError::HeaderMismatch {
            path: path.to_path_buf(),
            found: header.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut file = File::open(path).map_err(io_err)?;
    file.seek(SeekFrom::End(-1)).map_err(io_err)?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).map_err(io_err)?;
    Ok(last[0] != b'\n')
}

/// Load the whole history, sorted by timestamp (stable for equal timestamps)
pub fn load_history(path: &Path) -> Result<Vec<PriceObservation>, RenderError> {
    if !path.exists() {
        return Err(RenderError::MissingHistory(path.to_path_buf()));
    }

    let malformed = |line: u64, reason: String| RenderError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(source) => RenderError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => malformed(1, format!("{:?}", other)),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| malformed(1, e.to_string()))?
        .clone();
    if headers.iter().ne(PriceObservation::HEADER.iter().copied()) {
        if headers.is_empty() {
            return Err(RenderError::EmptyHistory(path.to_path_buf()));
        }
        return Err(malformed(
            1,
            format!(
                "expected header '{}', found '{}'",
                PriceObservation::HEADER.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        ));
    }

    let mut history = Vec::new();
    for result in reader.deserialize::<PriceObservation>() {
        let observation = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e.to_string())
        })?;

        if !observation.price.is_finite() {
            return Err(malformed(
                history.len() as u64 + 2,
                format!("non-finite price for '{}'", observation.asset_id),
            ));
        }
        history.push(observation);
    }

    if history.is_empty() {
        return Err(RenderError::EmptyHistory(path.to_path_buf()));
    }

    if history.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        warn!("History {} has out-of-order timestamps, sorting", path.display());
        history.sort_by_key(|o| o.timestamp);
    }

    debug!("Loaded {} history rows from {}", history.len(), path.display());
    Ok(history)
}

/// Unique scratch path in the system temp dir
#[cfg(test)]
pub fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("price-monitor-{}", uuid::Uuid::new_v4()))
        .join(name)
}
