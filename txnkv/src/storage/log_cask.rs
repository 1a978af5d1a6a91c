use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::CResult;
use crate::storage::engine::Engine;
use crate::storage::log::Log;
use crate::storage::{KeyDir, ScanIteratorT, Status};

/// The default capacity of the value read cache, 600 MiB.
pub const DEFAULT_CACHE_CAPACITY: usize = 600 * 1024 * 1024;

/// A very simple variant of LogCask, itself a very simple log-structured key-value engine.
///
/// LogCask writes key-value pairs to an append-only log file, and keeps a
/// mapping of keys to file positions in memory. All live keys must fit in
/// memory. Deletes write a tombstone value to the log file. To remove old
/// garbage, logs can be compacted by writing new logs containing only live
/// data, skipping replaced values and tombstones.
///
/// This implementation makes several significant simplifications over standard LogCask:
///
/// - Instead of writing multiple fixed-size log files, it uses a single
///   append-only log file of arbitrary size. This increases the compaction
///   volume, since the entire log file must be rewritten on every compaction,
///   and can exceed the filesystem's file size limit.
///
/// - Hint files are not used, the log itself is scanned when opened to
///   build the keydir. Hint files only omit values, the hint files would be nearly as large as
///   the compacted log files themselves.
///
/// - Log entries don't contain timestamps or checksums.
///
/// Values are read through a byte-budgeted cache keyed by log offset, so hot
/// keys don't hit the disk on every access. Appends never invalidate cached
/// offsets; compaction rewrites the file and drops the cache wholesale.
pub struct LogCask {
    /// The active append-only log file.
    log: Log,

    /// use index, Maps keys to a value position and length in the log file.
    keydir: KeyDir,

    /// A read-only handle plus the value cache, shared by concurrent readers.
    reader: Mutex<LogReader>,
}

impl LogCask {
    /// Opens or creates a LogCask in the given file, with the default cache.
    pub fn new(path: PathBuf) -> CResult<Self> {
        Self::new_with_cache(path, DEFAULT_CACHE_CAPACITY)
    }

    /// Opens or creates a LogCask with a value cache of the given capacity
    /// in bytes.
    pub fn new_with_cache(path: PathBuf, cache_capacity: usize) -> CResult<Self> {
        let mut log = Log::new(path)?;
        let keydir = log.build_keydir()?;
        let reader =
            Mutex::new(LogReader { file: log.open_reader()?, cache: ReadCache::new(cache_capacity) });
        Ok(Self { log, keydir, reader })
    }

    /// Opens a LogCask, and automatically compacts it if the amount
    /// of garbage exceeds the given ratio when opened.
    pub fn new_compact(path: PathBuf, garbage_ratio_threshold: f64) -> CResult<Self> {
        let mut s = Self::new(path)?;

        let status = s.status()?;
        let garbage_ratio = status.garbage_disk_size as f64 / status.total_disk_size as f64;
        if status.garbage_disk_size > 0 && garbage_ratio >= garbage_ratio_threshold {
            log::info!(
                "Compacting {} to remove {:.3}MB garbage ({:.0}% of {:.3}MB)",
                s.log.path.display(),
                status.garbage_disk_size / 1024 / 1024,
                garbage_ratio * 100.0,
                status.total_disk_size / 1024 / 1024
            );
            s.compact()?;
            log::info!(
                "Compacted {} to size {:.3}MB",
                s.log.path.display(),
                (status.total_disk_size - status.garbage_disk_size) / 1024 / 1024
            );
        }

        Ok(s)
    }
}

impl std::fmt::Display for LogCask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "log cask")
    }
}

impl Engine for LogCask {
    type ScanIterator<'a> = LogScanIterator<'a>;

    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        if let Some((value_pos, value_len)) = self.keydir.get(key) {
            Ok(Some(self.reader.lock()?.read_value(*value_pos, *value_len)?))
        } else {
            Ok(None)
        }
    }

    fn scan(&self, range: impl std::ops::RangeBounds<Vec<u8>>) -> Self::ScanIterator<'_>
        where Self: Sized {
        LogScanIterator { inner: self.keydir.range(range), reader: &self.reader }
    }

    fn scan_dyn(
        &self,
        range: (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>),
    ) -> Box<dyn ScanIteratorT + '_> {
        Box::new(self.scan(range))
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        let (pos, len) = self.log.write_entry(key, Some(&*value))?;
        let value_len = value.len() as u32;
        self.keydir.insert(key.to_vec(), (pos + len as u64 - value_len as u64, value_len));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.log.write_entry(key, None)?;
        self.keydir.remove(key);
        Ok(())
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(self.log.file.sync_all()?)
    }

    fn status(&self) -> CResult<Status> {
        let keys = self.keydir.len() as u64;
        let size = self
            .keydir
            .iter()
            .fold(0, |size, (key, (_, value_len))| size + key.len() as u64 + *value_len as u64);
        let total_disk_size = self.log.file.metadata()?.len();
        let live_disk_size = size + 8 * keys; // account for length prefixes
        let garbage_disk_size = total_disk_size - live_disk_size;
        Ok(Status {
            name: self.to_string(),
            keys,
            size,
            total_disk_size,
            live_disk_size,
            garbage_disk_size,
        })
    }
}

impl LogCask {
    /// Compacts the current log file by writing out a new log file containing
    /// only live keys and replacing the current file with it.
    pub fn compact(&mut self) -> CResult<()> {
        let mut tmp_path = self.log.path.clone();
        // need double disk size
        tmp_path.set_extension("new");

        let (mut new_log, new_keydir) = self.write_log(tmp_path)?;

        std::fs::rename(&new_log.path, &self.log.path).map_err(|err| {
            crate::error::Error::Internal(format!(
                "db file compact error, from {:?} to {:?}, cause: {}",
                &new_log.path.to_str(),
                &self.log.path.to_str(),
                err
            ))
        })?;
        new_log.path = self.log.path.clone();

        self.log = new_log;
        self.keydir = new_keydir;

        // Offsets moved, so the old cache contents and read handle are stale.
        let mut reader = self.reader.lock()?;
        reader.file = self.log.open_reader()?;
        reader.cache.clear();
        Ok(())
    }

    /// Writes out a new log file with the live entries of the current log file
    /// and returns it along with its keydir. Entries are written in key order.
    fn write_log(&mut self, path: PathBuf) -> CResult<(Log, KeyDir)> {
        let mut new_keydir = KeyDir::new();
        let mut new_log = Log::new(path)?;
        new_log.file.set_len(0)?; // truncate file if it exists
        for (key, (value_pos, value_len)) in self.keydir.iter() {
            let value = self.log.read_value(*value_pos, *value_len)?;
            let (pos, len) = new_log.write_entry(key, Some(&value))?;
            new_keydir.insert(key.clone(), (pos + len as u64 - *value_len as u64, *value_len));
        }
        Ok((new_log, new_keydir))
    }
}

/// Attempt to flush the file when the LogCask is closed.
impl Drop for LogCask {
    fn drop(&mut self) {
        if let Err(error) = self.flush() {
            log::error!("failed to flush file: {}", error)
        }
    }
}

/// The read half of the cask: a separate file handle and the value cache.
struct LogReader {
    file: std::fs::File,
    cache: ReadCache,
}

impl LogReader {
    fn read_value(&mut self, value_pos: u64, value_len: u32) -> CResult<Vec<u8>> {
        if let Some(value) = self.cache.get(value_pos) {
            return Ok(value);
        }
        let mut value = vec![0; value_len as usize];
        self.file.seek(SeekFrom::Start(value_pos))?;
        self.file.read_exact(&mut value)?;
        self.cache.insert(value_pos, &value);
        Ok(value)
    }
}

/// A byte-budgeted cache of values by log offset. Offsets are unique in an
/// append-only log, so entries never go stale until compaction clears the
/// whole cache. Eviction is insertion-ordered.
struct ReadCache {
    capacity: usize,
    used: usize,
    entries: HashMap<u64, Vec<u8>>,
    order: VecDeque<u64>,
}

impl ReadCache {
    fn new(capacity: usize) -> Self {
        Self { capacity, used: 0, entries: HashMap::new(), order: VecDeque::new() }
    }

    fn get(&self, pos: u64) -> Option<Vec<u8>> {
        self.entries.get(&pos).cloned()
    }

    fn insert(&mut self, pos: u64, value: &[u8]) {
        if value.len() > self.capacity || self.entries.contains_key(&pos) {
            return;
        }
        while self.used + value.len() > self.capacity {
            let Some(evict) = self.order.pop_front() else { break };
            if let Some(old) = self.entries.remove(&evict) {
                self.used -= old.len();
            }
        }
        self.used += value.len();
        self.entries.insert(pos, value.to_vec());
        self.order.push_back(pos);
    }

    fn clear(&mut self) {
        self.used = 0;
        self.entries.clear();
        self.order.clear();
    }
}

pub struct LogScanIterator<'a> {
    inner: std::collections::btree_map::Range<'a, Vec<u8>, (u64, u32)>,
    reader: &'a Mutex<LogReader>,
}

impl<'a> LogScanIterator<'a> {
    fn map(&mut self, item: (&Vec<u8>, &(u64, u32))) -> <Self as Iterator>::Item {
        let (key, (value_pos, value_len)) = item;
        Ok((key.clone(), self.reader.lock()?.read_value(*value_pos, *value_len)?))
    }
}

impl<'a> Iterator for LogScanIterator<'a> {
    type Item = CResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| self.map(item))
    }
}

impl<'a> DoubleEndedIterator for LogScanIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|item| self.map(item))
    }
}
