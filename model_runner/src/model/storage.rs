//! Block-addressable storage for the model region.

use std::{
    fs::{self, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Value erased bytes read back as.
pub const ERASED: u8 = 0xff;

/// Storage holding at most one allocated region.
pub trait BlockStore: Send {
    /// The total size in bytes of the store.
    fn capacity(&self) -> usize;

    /// Drops the current region.
    fn erase(&mut self) -> io::Result<()>;

    /// Allocates an erased region of `size` bytes, replacing the current one.
    fn allocate(&mut self, size: usize) -> io::Result<()>;

    /// Writes `data` at `offset` bytes into the region.
    fn write(&mut self, offset: usize, data: &[u8]) -> io::Result<()>;

    /// The current region, empty if none is allocated.
    fn region(&self) -> &[u8];
}

/// A block store living in memory.
#[derive(Debug)]
pub struct MemoryBlockStore {
    capacity: usize,
    region: Vec<u8>,
}

impl MemoryBlockStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            region: Vec::new(),
        }
    }

    fn check_write(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.region.len() => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write of {len} bytes at {offset} overflows the {} bytes region",
                    self.region.len()
                ),
            )),
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn erase(&mut self) -> io::Result<()> {
        self.region.clear();
        Ok(())
    }

    fn allocate(&mut self, size: usize) -> io::Result<()> {
        if size > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                format!("region of {size} bytes exceeds the {} bytes store", self.capacity),
            ));
        }

        self.region.clear();
        self.region.resize(size, ERASED);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        self.check_write(offset, data.len())?;
        self.region[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn region(&self) -> &[u8] {
        &self.region
    }
}

/// A block store mirrored into a file, every change reaches the file before returning.
#[derive(Debug)]
pub struct FileBlockStore {
    path: PathBuf,
    mem: MemoryBlockStore,
}

impl FileBlockStore {
    /// Opens the store at `path`, picking up the region left by a previous run.
    ///
    /// # Arguments
    /// * `path` - The file holding the region.
    /// * `capacity` - The total size in bytes of the store.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut mem = MemoryBlockStore::new(capacity);

        match fs::read(&path) {
            Ok(region) if region.len() <= capacity => mem.region = region,
            Ok(region) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "stored region of {} bytes exceeds the {capacity} bytes store",
                        region.len()
                    ),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        Ok(Self { path, mem })
    }
}

impl BlockStore for FileBlockStore {
    fn capacity(&self) -> usize {
        self.mem.capacity()
    }

    fn erase(&mut self) -> io::Result<()> {
        self.mem.erase()?;

        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn allocate(&mut self, size: usize) -> io::Result<()> {
        self.mem.allocate(size)?;
        fs::write(&self.path, self.mem.region())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        self.mem.write(offset, data)?;

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)?;
        file.sync_data()
    }

    fn region(&self) -> &[u8] {
        self.mem.region()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_erased() {
        let mut store = MemoryBlockStore::new(64);
        store.allocate(16).unwrap();

        assert_eq!(store.region(), [ERASED; 16]);
        assert!(store.allocate(65).is_err());
    }

    #[test]
    fn writes_stay_in_region() {
        let mut store = MemoryBlockStore::new(64);
        store.allocate(16).unwrap();

        store.write(8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(&store.region()[8..], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(store.write(12, &[0; 8]).is_err());
        assert!(store.write(usize::MAX, &[0]).is_err());

        store.erase().unwrap();
        assert!(store.region().is_empty());
        assert!(store.write(0, &[0]).is_err());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let mut store = FileBlockStore::open(&path, 32).unwrap();
        store.allocate(16).unwrap();
        store.write(8, &[7; 8]).unwrap();

        let mut store = FileBlockStore::open(&path, 32).unwrap();
        assert_eq!(&store.region()[..8], [ERASED; 8]);
        assert_eq!(&store.region()[8..], [7; 8]);

        store.erase().unwrap();
        let store = FileBlockStore::open(&path, 32).unwrap();
        assert!(store.region().is_empty());
    }
}
