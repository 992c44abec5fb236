use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Link settings read from an optional YAML profile. Command line flags win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkProfile {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub response_timeout_ms: u64,
    pub pacing_ms: u64,
    pub settle_ms: u64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            response_timeout_ms: 2000,
            pacing_ms: 15,
            settle_ms: 400,
        }
    }
}

impl LinkProfile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading link profile: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing link profile: {}", path.display()))
    }

    /// The profile at `path`, or the defaults when no path was given.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let profile: LinkProfile = serde_yaml::from_str("port: /dev/ttyACM0\npacing_ms: 5\n").unwrap();
        assert_eq!(profile.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(profile.pacing(), Duration::from_millis(5));
        assert_eq!(profile.response_timeout(), Duration::from_millis(2000));
        assert_eq!(profile.settle(), Duration::from_millis(400));
    }

    #[test]
    fn profile_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.yaml");
        std::fs::write(&path, "baud_rate: 9600\n").unwrap();
        let profile = LinkProfile::load_or_default(Some(&path)).unwrap();
        assert_eq!(profile.baud_rate, 9600);
        assert_eq!(LinkProfile::load_or_default(None).unwrap(), LinkProfile::default());
        assert!(LinkProfile::load(dir.path().join("absent.yaml")).is_err());
    }
}
