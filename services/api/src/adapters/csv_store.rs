//! services/api/src/adapters/csv_store.rs
//!
//! This module contains the file adapter, which is the concrete implementation
//! of the `SessionStore` port from the `core` crate. It keeps the session log in
//! a single CSV file with the canonical header.
//!
//! Appends and rewrites are serialized by an async mutex. Full rewrites go to a
//! temporary file in the same directory that is then renamed over the log.

use async_trait::async_trait;
use ev_tracker_core::domain::{ChargingSession, NormalizedLog, RawRecord, CANONICAL_COLUMNS};
use ev_tracker_core::normalize;
use ev_tracker_core::ports::{PortError, PortResult, SessionStore};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

//=========================================================================================
// Adapter-internal Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("could not replace the log file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl From<StoreError> for PortError {
    fn from(e: StoreError) -> Self {
        PortError::Storage(e.to_string())
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A CSV-file adapter that implements the `SessionStore` port.
pub struct CsvSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSessionStore {
    /// Creates a new `CsvSessionStore`. The file is not touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs a file operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> PortResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .map_err(PortError::from)
    }
}

//=========================================================================================
// File Operations
//=========================================================================================

fn ensure_file(path: &Path) -> Result<(), StoreError> {
    let needs_header = match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };
    if needs_header {
        info!("Creating session log at {}", path.display());
        write_all(path, &NormalizedLog::default())?;
    }
    Ok(())
}

/// Cells are decoded lossily: a bad byte degrades its own cell, never the row.
fn decode(cell: &[u8]) -> String {
    String::from_utf8_lossy(cell).into_owned()
}

fn header_names(reader: &mut csv::Reader<File>) -> Result<Vec<String>, StoreError> {
    Ok(reader
        .byte_headers()?
        .iter()
        .map(|name| decode(name).trim().to_string())
        .collect())
}

fn read_records(path: &Path) -> Result<Vec<RawRecord>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;
    let headers = header_names(&mut reader)?;

    let mut records = Vec::new();
    for (line, result) in reader.byte_records().enumerate() {
        match result {
            Ok(row) => records.push(
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| (column.clone(), decode(cell)))
                    .collect(),
            ),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => warn!(
                "Skipping unreadable row {} in {}: {}",
                line + 2,
                path.display(),
                e
            ),
        }
    }
    debug!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

fn has_canonical_header(path: &Path) -> Result<bool, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)?;
    let headers = header_names(&mut reader)?;
    Ok(headers.iter().map(String::as_str).eq(CANONICAL_COLUMNS))
}

fn ends_with_newline(file: &mut File) -> Result<bool, StoreError> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn append_row(path: &Path, session: &ChargingSession) -> Result<(), StoreError> {
    ensure_file(path)?;
    if !has_canonical_header(path)? {
        // Legacy column set: backfill the whole file into the canonical schema.
        info!("Rewriting {} into the canonical column set", path.display());
        let mut log = normalize(&read_records(path)?);
        log.push(session.clone());
        return write_all(path, &log);
    }

    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    if !ends_with_newline(&mut file)? {
        // The last row was saved without a line ending.
        file.write_all(b"\n")?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(session.to_row())?;
    writer.flush()?;
    Ok(())
}

fn write_all(path: &Path, log: &NormalizedLog) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(staged.as_file_mut());
        writer.write_record(CANONICAL_COLUMNS)?;
        for session in log {
            writer.write_record(session.to_row())?;
        }
        writer.flush()?;
    }
    staged.as_file_mut().flush()?;
    staged.as_file().sync_all()?;
    staged.persist(path)?;
    Ok(())
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for CsvSessionStore {
    async fn ensure_initialized(&self) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.blocking(|path| ensure_file(path)).await
    }

    async fn load_records(&self) -> PortResult<Vec<RawRecord>> {
        self.blocking(|path| read_records(path)).await
    }

    async fn append(&self, session: &ChargingSession) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let session = session.clone();
        self.blocking(move |path| append_row(path, &session)).await
    }

    async fn replace_all(&self, log: &NormalizedLog) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let log = log.clone();
        let count = log.len();
        self.blocking(move |path| write_all(path, &log)).await?;
        info!("Rewrote {} with {} sessions", self.path.display(), count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ev_tracker_core::domain::{ChargeType, Coordinates, SessionFields};
    use tempfile::tempdir;

    fn session(day: u32, location: &str, kwh: f64, cost: f64) -> ChargingSession {
        ChargingSession::from_fields(SessionFields {
            date: NaiveDate::from_ymd_opt(2024, 3, day),
            time: None,
            provider: "Gentari".to_string(),
            location: location.to_string(),
            coordinates: None,
            charge_type: Some(ChargeType::Dc),
            energy_kwh: kwh,
            total_cost: cost,
        })
    }

    const HEADER: &str =
        "Date,Provider,Location,Latitude,Longitude,Type,kWh,Total Cost,Cost_per_kWh,Month\n";

    #[tokio::test]
    async fn missing_file_is_created_with_header_only() {
        let dir = tempdir().unwrap();
        let store = CsvSessionStore::new(dir.path().join("log.csv"));

        store.ensure_initialized().await.unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), HEADER);
        assert!(store.load_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_file_gets_a_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "").unwrap();

        CsvSessionStore::new(&path).ensure_initialized().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), HEADER);
    }

    #[tokio::test]
    async fn existing_rows_are_left_alone_by_initialization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let body = format!("{}2024-03-01,Gentari,KLCC,,,DC,20,30,1.5,2024-03\n", HEADER);
        fs::write(&path, &body).unwrap();

        CsvSessionStore::new(&path).ensure_initialized().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn appended_rows_are_written_in_canonical_order() {
        let dir = tempdir().unwrap();
        let store = CsvSessionStore::new(dir.path().join("log.csv"));
        let mut first = session(1, "KLCC", 20.0, 30.0);
        first.coordinates = Some(Coordinates::new(3.158, 101.712));

        store.append(&first).await.unwrap();
        store.append(&session(2, "Suria, KLCC", 10.0, 12.0)).await.unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER.trim_end());
        assert_eq!(lines[1], "2024-03-01,Gentari,KLCC,3.158,101.712,DC,20,30,1.5,2024-03");
        assert_eq!(lines[2], "2024-03-02,Gentari,\"Suria, KLCC\",,,DC,10,12,1.2,2024-03");

        let log = normalize(&store.load_records().await.unwrap());
        assert_eq!(log.sessions()[0], first);
        assert_eq!(log.sessions()[1].location, "Suria, KLCC");
    }

    #[tokio::test]
    async fn legacy_header_is_backfilled_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            "Date,Provider,Location,Type,kWh,Total Cost,Cost_per_kWh\n\
             2024-02-10,JomCharge,Home,AC,7,3.5,0.5\n",
        )
        .unwrap();
        let store = CsvSessionStore::new(&path);

        store.append(&session(1, "KLCC", 20.0, 30.0)).await.unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.trim_end());
        assert_eq!(lines[1], "2024-02-10,JomCharge,Home,,,AC,7,3.5,0.5,2024-02");
    }

    #[tokio::test]
    async fn replace_all_rewrites_the_whole_file() {
        let dir = tempdir().unwrap();
        let store = CsvSessionStore::new(dir.path().join("log.csv"));
        for day in 1..=3 {
            store.append(&session(day, "KLCC", 10.0, 10.0)).await.unwrap();
        }

        let kept = NormalizedLog::new(vec![session(2, "KLCC", 10.0, 10.0)]);
        store.replace_all(&kept).await.unwrap();

        let log = normalize(&store.load_records().await.unwrap());
        assert_eq!(log, kept);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temporary file left behind");
    }

    #[tokio::test]
    async fn ragged_rows_are_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, format!("{}2024-03-01,Gentari,KLCC\n", HEADER)).unwrap();

        let records = CsvSessionStore::new(&path).load_records().await.unwrap();
        assert_eq!(records.len(), 1);
        let log = normalize(&records);
        assert_eq!(log.sessions()[0].provider, "Gentari");
        assert_eq!(log.sessions()[0].energy_kwh, 0.0);
    }

    #[tokio::test]
    async fn unreadable_path_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let store = CsvSessionStore::new(dir.path().join("missing").join("log.csv"));
        assert!(matches!(
            store.load_records().await,
            Err(PortError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_degrades_only_its_cell() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut body = HEADER.as_bytes().to_vec();
        body.extend_from_slice(b"2024-03-01,Gentari,Caf\xe9 KL,,,DC,20,30,1.5,2024-03\n");
        body.extend_from_slice(b"2024-03-02,Gentari,KLCC,,,DC,10,12,1.2,2024-03\n");
        fs::write(&path, body).unwrap();
        let store = CsvSessionStore::new(&path);

        let log = normalize(&store.load_records().await.unwrap());
        assert_eq!(log.len(), 2);
        assert_eq!(log.sessions()[0].location, "Caf\u{FFFD} KL");
        assert_eq!(log.sessions()[0].energy_kwh, 20.0);

        store.replace_all(&log).await.unwrap();
        let reread = normalize(&store.load_records().await.unwrap());
        assert_eq!(reread, log);
    }

    #[tokio::test]
    async fn append_after_a_missing_final_newline_starts_a_new_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            format!("{}2024-03-01,Gentari,KLCC,,,DC,20,30,1.5,2024-03", HEADER),
        )
        .unwrap();
        let store = CsvSessionStore::new(&path);

        store.append(&session(2, "Home", 7.0, 3.0)).await.unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "2024-03-01,Gentari,KLCC,,,DC,20,30,1.5,2024-03");
        let log = normalize(&store.load_records().await.unwrap());
        assert_eq!(log.len(), 2);
        assert_eq!(log.sessions()[1].location, "Home");
    }
}
