use crate::error::ConfigError;
use crate::Channel::Ring::layout::MIN_CAPACITY;
use crate::Stream::{SizeClass, MAX_CHUNKS_LIMIT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/dmxp/chunkstream.toml";
const ENV_CONFIG_PATH: &str = "DMXP_CHUNKSTREAM_CONFIG";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl AgentConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Load from `$DMXP_CHUNKSTREAM_CONFIG` or the default path. A missing
    /// file yields defaults; a present but invalid one is an error.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(path);
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.channels.validate()?;

        // A chunk must fit in one record of the byte channel.
        let largest = [
            Some(self.stream.string_chunk),
            self.stream.byte_chunk,
            Some(SizeClass::Large),
        ]
        .into_iter()
        .flatten()
        .map(SizeClass::total_len)
        .max()
        .unwrap_or(0);
        let band = self.channels.chunk_capacity.max(MIN_CAPACITY).next_power_of_two();
        let record_max = band / 4 - 8;
        if largest > record_max {
            return Err(ConfigError::Invalid(format!(
                "chunk of {} bytes does not fit a {} byte chunk channel",
                largest, self.channels.chunk_capacity
            )));
        }
        Ok(())
    }
}

/// Copy-engine knobs shared by every invocation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Chunks one copy may commit before it truncates.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    /// Chunk class for string copies.
    #[serde(default)]
    pub string_chunk: SizeClass,
    /// Chunk class for byte copies. `None` picks the smallest class that
    /// holds the whole range, else `Large`.
    #[serde(default)]
    pub byte_chunk: Option<SizeClass>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            string_chunk: SizeClass::default(),
            byte_chunk: None,
        }
    }
}

impl StreamConfig {
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub fn with_string_chunk(mut self, class: SizeClass) -> Self {
        self.string_chunk = class;
        self
    }

    pub fn with_byte_chunk(mut self, class: SizeClass) -> Self {
        self.byte_chunk = Some(class);
        self
    }

    /// Same class for both copy kinds.
    pub fn with_chunk_class(self, class: SizeClass) -> Self {
        self.with_string_chunk(class).with_byte_chunk(class)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunks == 0 || self.max_chunks > MAX_CHUNKS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_chunks must be in 1..={}, got {}",
                MAX_CHUNKS_LIMIT, self.max_chunks
            )));
        }
        for class in std::iter::once(self.string_chunk).chain(self.byte_chunk) {
            if !class.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "unusable chunk class {:?}",
                    class
                )));
            }
        }
        Ok(())
    }
}

fn default_max_chunks() -> usize {
    16
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Data bytes of the chunk channel.
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
    /// Data bytes of the record channel.
    #[serde(default = "default_record_capacity")]
    pub record_capacity: usize,
    /// Back both channels with `/dev/shm/<prefix>-chunks` and
    /// `/dev/shm/<prefix>-records`. Heap-backed when unset.
    #[serde(default)]
    pub shm_prefix: Option<String>,
    #[serde(default = "default_notify")]
    pub notify: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: default_chunk_capacity(),
            record_capacity: default_record_capacity(),
            shm_prefix: None,
            notify: default_notify(),
        }
    }
}

impl ChannelConfig {
    pub fn chunk_channel_name(&self) -> Option<String> {
        self.shm_prefix.as_ref().map(|p| format!("{}-chunks", p))
    }

    pub fn record_channel_name(&self) -> Option<String> {
        self.shm_prefix.as_ref().map(|p| format!("{}-records", p))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.shm_prefix {
            if prefix.is_empty() || prefix.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "invalid shared memory prefix {:?}",
                    prefix
                )));
            }
        }
        Ok(())
    }
}

fn default_chunk_capacity() -> usize {
    4 * 1024 * 1024
}
fn default_record_capacity() -> usize {
    1024 * 1024
}
fn default_notify() -> bool {
    true
}

/// Consumer-side limits.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Chunks held while waiting for the record that references them.
    /// Oldest are evicted first, which also reaps orphans.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
        }
    }
}

fn default_max_pending() -> usize {
    64 * 1024
}
