// apps/recorder/src/config.rs
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    ops::RangeInclusive,
    path::{Component, Path, PathBuf},
};

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORTS: RangeInclusive<u16> = 5030..=5040;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no sessions configured")]
    Empty,
    #[error("{0} is configured more than once")]
    DuplicateListener(String),
    #[error("output {} is used by more than one session", .0.display())]
    DuplicateOutput(PathBuf),
}

/// One recorded listener: where to listen and where the session file goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub output: PathBuf,
    pub listen_address: String,
    pub listen_port: u16,
}

impl SessionDescriptor {
    pub fn new(output: impl Into<PathBuf>, listen_address: impl Into<String>, listen_port: u16) -> Self {
        Self { output: output.into(), listen_address: listen_address.into(), listen_port }
    }

    /// Short name for the live readout: the output file stem.
    pub fn label(&self) -> String {
        self.output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.listener())
    }

    pub fn listener(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub sessions: Vec<SessionDescriptor>,
}

impl Default for RecorderConfig {
    /// One car per port, `Car-<port>.csv` in the working directory.
    fn default() -> Self {
        Self::port_range(DEFAULT_LISTEN_ADDRESS, DEFAULT_PORTS)
    }
}

impl RecorderConfig {
    pub fn port_range(listen_address: &str, ports: RangeInclusive<u16>) -> Self {
        let sessions = ports
            .map(|port| SessionDescriptor::new(format!("Car-{port}.csv"), listen_address, port))
            .collect();
        Self { sessions }
    }

    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    /// Port 0 asks the OS for an ephemeral port, so it never collides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut listeners = HashSet::new();
        let mut outputs = HashSet::new();
        for s in &self.sessions {
            if s.listen_port != 0 && !listeners.insert((s.listen_address.as_str(), s.listen_port)) {
                return Err(ConfigError::DuplicateListener(s.listener()));
            }
            if !outputs.insert(output_key(&s.output)) {
                return Err(ConfigError::DuplicateOutput(s.output.clone()));
            }
        }
        Ok(())
    }
}

/// `a.csv` and `./a.csv` name the same file.
fn output_key(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}
