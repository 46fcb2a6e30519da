use {
    anyhow::{Context, Result},
    byte_unit::Byte,
    derivative::Derivative,
    nodecrypt_protocol::AesKey,
    nodecrypt_sdk::crypto::DEFAULT_MAX_IN_MEMORY,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "nodecrypt.json5";

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Config {
    /// Account master key. Needed for `tree` and `share`.
    #[derivative(Debug = "ignore")]
    #[serde(default)]
    pub master_key: Option<AesKey>,
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Encrypted output is kept in memory up to this size before spilling to disk.
    #[serde(default = "default_spool_in_memory")]
    pub spool_in_memory: Byte,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_key: None,
            user_handle: None,
            log_filter: default_log_filter(),
            spool_in_memory: default_spool_in_memory(),
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(json5::from_str(text)?)
    }

    /// Loads `path`, or the default config file if present.
    ///
    /// A missing default file yields the default config; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::parse(&fs_err::read_to_string(path)?);
        }
        let path = default_config_path()?;
        if !path.try_exists()? {
            return Ok(Self::default());
        }
        Self::parse(&fs_err::read_to_string(&path)?)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn master_key(&self) -> Result<&AesKey> {
        self.master_key
            .as_ref()
            .context("missing `master_key` in config")
    }

    pub fn spool_in_memory(&self) -> Result<usize> {
        Ok(usize::try_from(self.spool_in_memory.as_u64())?)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("cannot find config dir")?;
    Ok(config_dir.join(CONFIG_FILE_NAME))
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_spool_in_memory() -> Byte {
    Byte::from_u64(u64::try_from(DEFAULT_MAX_IN_MEMORY).unwrap_or(u64::MAX))
}
