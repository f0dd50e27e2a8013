//! Append-only file backend
//!
//! Layout (little endian):
//!
//! ```text
//! header : b"RCSP" | version u32
//! entry  : key u64 | edge count u32 | EdgeRecord * count (18 bytes each)
//! ```
//!
//! Every `put` appends a full entry; the latest entry for a key wins. The
//! offset index lives in memory and is rebuilt by scanning on `open`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};

use super::{EntryIter, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::graph::EdgeRecord;
use crate::position::PositionKey;

const MAGIC: &[u8; 4] = b"RCSP";
const VERSION: u32 = 1;
const HEADER_SIZE: u64 = 8;
const ENTRY_HEADER_SIZE: u64 = 8 + 4;

/// Append-only spill file with an in-memory offset index
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    index: HashMap<PositionKey, u64>,
    end: u64,
}

impl FileBackend {
    /// Open (or create) a spill file and rebuild its index
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let len = file.metadata()?.len();

        if len == 0 {
            file.write_all(MAGIC)?;
            file.write_u32::<LittleEndian>(VERSION)?;
            debug!("created spill file {}", path.display());
            return Ok(FileBackend {
                path,
                file: Mutex::new(file),
                index: HashMap::new(),
                end: HEADER_SIZE,
            });
        }

        let index = scan(&mut file, len)?;
        info!("opened spill file {} ({} keys, {} bytes)", path.display(), index.len(), len);
        Ok(FileBackend {
            path,
            file: Mutex::new(file),
            index,
            end: len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes used on disk, including superseded entries
    pub fn file_len(&self) -> u64 {
        self.end
    }

    fn read_entry(&self, key: PositionKey, offset: u64) -> StorageResult<Vec<EdgeRecord>> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let file = &mut *guard;
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(file);
        let stored = PositionKey(reader.read_u64::<LittleEndian>()?);
        if stored != key {
            return Err(StorageError::Corrupt {
                offset,
                reason: format!("index points at {stored}, expected {key}"),
            });
        }
        let count = reader.read_u32::<LittleEndian>()?;
        (0..count)
            .map(|_| EdgeRecord::read_from(&mut reader).map_err(StorageError::from))
            .collect()
    }
}

/// ファイル全体を走査してキー → 最新エントリ位置の索引を作る
fn scan(file: &mut File, len: u64) -> StorageResult<HashMap<PositionKey, u64>> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(StorageError::Corrupt {
            offset: 0,
            reason: "bad magic".to_string(),
        });
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(StorageError::Corrupt {
            offset: 4,
            reason: format!("unsupported version {version}"),
        });
    }

    let mut index = HashMap::new();
    let mut offset = HEADER_SIZE;
    while offset < len {
        if offset + ENTRY_HEADER_SIZE > len {
            return Err(truncated(offset));
        }
        let key = PositionKey(reader.read_u64::<LittleEndian>()?);
        let count = u64::from(reader.read_u32::<LittleEndian>()?);
        let body = count * EdgeRecord::PACKED_SIZE as u64;
        let next = offset + ENTRY_HEADER_SIZE + body;
        if next > len {
            return Err(truncated(offset));
        }
        reader.seek_relative(body as i64)?;
        index.insert(key, offset);
        offset = next;
    }
    Ok(index)
}

fn truncated(offset: u64) -> StorageError {
    StorageError::Corrupt {
        offset,
        reason: "truncated entry".to_string(),
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: PositionKey) -> StorageResult<Option<Vec<EdgeRecord>>> {
        match self.index.get(&key) {
            Some(&offset) => self.read_entry(key, offset).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: PositionKey, edges: &[EdgeRecord]) -> StorageResult<()> {
        let mut buf =
            Vec::with_capacity(ENTRY_HEADER_SIZE as usize + edges.len() * EdgeRecord::PACKED_SIZE);
        buf.write_u64::<LittleEndian>(key.raw())?;
        buf.write_u32::<LittleEndian>(edges.len() as u32)?;
        for edge in edges {
            edge.write_to(&mut buf)?;
        }

        let file = self.file.get_mut().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(self.end))?;
        file.write_all(&buf)?;
        self.index.insert(key, self.end);
        self.end += buf.len() as u64;
        Ok(())
    }

    fn iterate_all(&self) -> StorageResult<EntryIter<'_>> {
        let mut entries: Vec<(PositionKey, u64)> = self.index.iter().map(|(k, o)| (*k, *o)).collect();
        entries.sort_unstable();
        Ok(Box::new(
            entries
                .into_iter()
                .map(move |(key, offset)| self.read_entry(key, offset).map(|edges| (key, edges))),
        ))
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn flush(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut().unwrap_or_else(PoisonError::into_inner);
        file.sync_data()?;
        Ok(())
    }
}
