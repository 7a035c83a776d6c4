//! Persistent key/value settings surviving restarts.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Key of the persisted configuration blob.
pub const CONFIG_KEY: &str = "config";
/// Key of the persisted arena size hint, a little-endian `u32`.
pub const ARENA_KEY: &str = "arena";

/// A persistent key/value store of raw byte values.
pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()>;

    fn remove(&mut self, key: &str) -> io::Result<()>;

    /// Reads a little-endian `u32` value.
    ///
    /// # Returns
    /// `None` if the key is missing or doesn't hold exactly four bytes.
    fn get_u32(&self, key: &str) -> Option<u32> {
        let value = self.get(key)?;
        Some(u32::from_le_bytes(value.try_into().ok()?))
    }

    fn set_u32(&mut self, key: &str, value: u32) -> io::Result<()> {
        self.set(key, &value.to_le_bytes())
    }
}

/// Settings kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: BTreeMap<String, Vec<u8>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()> {
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    values: BTreeMap<String, Vec<u8>>,
}

/// Settings persisted as a JSON document, rewritten on every change.
#[derive(Debug)]
pub struct JsonSettings {
    path: PathBuf,
    file: SettingsFile,
}

impl JsonSettings {
    /// Opens the settings document at `path`, starting empty if it doesn't exist yet.
    ///
    /// # Arguments
    /// * `path` - The JSON document location.
    ///
    /// # Returns
    /// The settings store or an io error if the document exists but can't be read.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => SettingsFile::default(),
            Err(e) => return Err(e),
        };

        Ok(Self { path, file })
    }

    fn flush(&self) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(tmp, &self.path)
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.file.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()> {
        self.file.values.insert(key.to_string(), value.to_vec());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        if self.file.values.remove(key).is_some() {
            self.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_values() {
        let mut settings = MemorySettings::new();
        assert_eq!(settings.get_u32(ARENA_KEY), None);

        settings.set_u32(ARENA_KEY, 1234).unwrap();
        assert_eq!(settings.get_u32(ARENA_KEY), Some(1234));

        settings.set(ARENA_KEY, &[1, 2]).unwrap();
        assert_eq!(settings.get_u32(ARENA_KEY), None);

        settings.remove(ARENA_KEY).unwrap();
        assert_eq!(settings.get(ARENA_KEY), None);
    }

    #[test]
    fn json_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = JsonSettings::open(&path).unwrap();
        settings.set(CONFIG_KEY, &[100, 0, 3, 0, 0, 0, 0, 0]).unwrap();
        settings.set_u32(ARENA_KEY, 96).unwrap();
        settings.remove(ARENA_KEY).unwrap();

        let settings = JsonSettings::open(&path).unwrap();
        assert_eq!(settings.get(CONFIG_KEY), Some(vec![100, 0, 3, 0, 0, 0, 0, 0]));
        assert_eq!(settings.get_u32(ARENA_KEY), None);
    }
}
