use std::{env, io, path::PathBuf};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_STATE_DIR: &str = ".model_runner";
const DEFAULT_MODEL_CAPACITY: usize = 64 * 1024;

/// Process level settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    host: String,
    port: u16,
    state_dir: PathBuf,
    model_capacity: usize,
}

impl RuntimeConfig {
    /// Reads `HOST`, `PORT`, `STATE_DIR` and `MODEL_CAPACITY` from the environment.
    ///
    /// # Returns
    /// The runtime configuration, or an io error if `PORT` is missing or a value
    /// can't be parsed.
    pub fn from_env() -> io::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> io::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT").ok_or_else(|| io::Error::other("PORT is not set"))?;
        let port = port
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("PORT: {e}")))?;

        let model_capacity = match lookup("MODEL_CAPACITY") {
            Some(value) => value.parse().map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("MODEL_CAPACITY: {e}"))
            })?,
            None => DEFAULT_MODEL_CAPACITY,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            state_dir: lookup("STATE_DIR")
                .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string())
                .into(),
            model_capacity,
        })
    }

    /// The address to listen at, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the persisted settings live.
    pub fn settings_path(&self) -> PathBuf {
        self.state_dir.join("settings.json")
    }

    /// Where the model region lives.
    pub fn model_path(&self) -> PathBuf {
        self.state_dir.join("model.bin")
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    /// The size in bytes of the model block store.
    pub fn model_capacity(&self) -> usize {
        self.model_capacity
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = RuntimeConfig::from_lookup(lookup(&[("PORT", "9000")])).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(config.model_capacity(), DEFAULT_MODEL_CAPACITY);
        assert_eq!(
            config.settings_path(),
            PathBuf::from(DEFAULT_STATE_DIR).join("settings.json")
        );
    }

    #[test]
    fn port_is_required() {
        assert!(RuntimeConfig::from_lookup(lookup(&[])).is_err());
        assert!(RuntimeConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("PORT", "1"),
            ("HOST", "0.0.0.0"),
            ("STATE_DIR", "/var/lib/runner"),
            ("MODEL_CAPACITY", "4096"),
        ]))
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:1");
        assert_eq!(config.model_path(), PathBuf::from("/var/lib/runner/model.bin"));
        assert_eq!(config.model_capacity(), 4096);
    }
}
