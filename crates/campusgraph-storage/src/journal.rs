//! Write-ahead journal of committed graph mutations.
//!
//! Each record is a little-endian `u32` length followed by a bincode-encoded
//! [`JournalEntry`]. Only committed batches are appended, so replaying the file
//! on top of the snapshot it was started from reproduces the store exactly.
//!
//! Opening a journal walks the length prefixes and cuts off a record left
//! incomplete by a crash, so later appends always follow a whole record.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::{GraphTable, MutationBatch};

/// Upper bound on a single encoded entry. A prefix above it is corruption,
/// not a torn write.
pub const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

const PREFIX_LEN: u64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    CopyDenseToRefined,
    Batch {
        table: GraphTable,
        batch: MutationBatch,
    },
}

pub struct MutationJournal {
    file: Mutex<File>,
    path: PathBuf,
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// Byte offset just past the last complete record, and the record count.
fn complete_prefix(file: &mut File) -> std::io::Result<(u64, usize)> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(&mut *file);
    reader.seek(SeekFrom::Start(0))?;

    let mut offset = 0u64;
    let mut records = 0usize;
    while file_len - offset >= PREFIX_LEN {
        let mut prefix = [0u8; PREFIX_LEN as usize];
        reader.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix);
        if len > MAX_RECORD_LEN {
            return Err(invalid_data(format!(
                "journal record at byte {offset} claims {len} bytes"
            )));
        }
        if file_len - offset - PREFIX_LEN < u64::from(len) {
            break;
        }
        reader.seek_relative(i64::from(len))?;
        offset += PREFIX_LEN + u64::from(len);
        records += 1;
    }
    Ok((offset, records))
}

impl MutationJournal {
    /// Open or create the journal, dropping any incomplete trailing record.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let (end, records) = complete_prefix(&mut file)?;
        if end < file_len {
            tracing::warn!(
                path = %path.display(),
                records,
                discarded = file_len - end,
                "discarding torn journal tail"
            );
            file.set_len(end)?;
            file.sync_data()?;
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and sync it to disk. Returns the bytes written.
    pub fn append(&self, entry: &JournalEntry) -> std::io::Result<u64> {
        let data = bincode::serialize(entry).map_err(|e| invalid_data(e.to_string()))?;
        let len = u32::try_from(data.len())
            .ok()
            .filter(|&len| len <= MAX_RECORD_LEN)
            .ok_or_else(|| invalid_data(format!("journal entry of {} bytes is too large", data.len())))?;

        let mut record = Vec::with_capacity(data.len() + PREFIX_LEN as usize);
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&data);

        let mut file = self.file.lock();
        file.write_all(&record)?;
        file.sync_data()?;
        Ok(record.len() as u64)
    }

    /// Feed every entry to `handler`, oldest first. Returns how many were
    /// replayed.
    pub fn replay<F: FnMut(JournalEntry) -> std::io::Result<()>>(
        &self,
        mut handler: F,
    ) -> std::io::Result<usize> {
        let mut file = self.file.lock();
        let (end, records) = complete_prefix(&mut file)?;
        file.seek(SeekFrom::Start(0))?;

        let mut reader = BufReader::new(&mut *file).take(end);
        for index in 0..records {
            let mut prefix = [0u8; PREFIX_LEN as usize];
            reader.read_exact(&mut prefix)?;
            let mut data = vec![0u8; u32::from_le_bytes(prefix) as usize];
            reader.read_exact(&mut data)?;

            let entry: JournalEntry = bincode::deserialize(&data)
                .map_err(|e| invalid_data(format!("journal record {index}: {e}")))?;
            handler(entry)?;
        }
        Ok(records)
    }

    /// Drop all entries, e.g. after the store has been snapshotted.
    pub fn truncate(&self) -> std::io::Result<()> {
        let file = self.file.lock();
        file.set_len(0)?;
        file.sync_data()
    }
}
