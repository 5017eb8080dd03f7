use std::{
    fs::{self, File},
    io::{self, Error, ErrorKind, Write},
    path::Path,
    time::Duration,
};

use crate::poll::Poller;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_VOLUME_TYPE: &str = "gp3";
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 2;

/// Represents the EBS workflow configuration.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default = "default_region")]
    pub region: String,
    /// Instances to snapshot and report on.
    /// The first entry is the default target of "replace".
    #[serde(default)]
    pub instance_ids: Vec<String>,

    /// KMS key for the restored volumes.
    /// The account default EBS key is used if none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default = "default_volume_type")]
    pub volume_type: String,
    #[serde(default)]
    pub snapshot_selection: SnapshotSelection,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Polls forever if none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_seconds: Option<u64>,
}

/// Decides which snapshot restores a volume when several were taken from it.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotSelection {
    /// The first snapshot in the provider listing order.
    #[default]
    FirstMatch,
    /// The snapshot with the latest start time.
    MostRecent,
}

fn default_region() -> String {
    String::from(DEFAULT_REGION)
}

fn default_volume_type() -> String {
    String::from(DEFAULT_VOLUME_TYPE)
}

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            instance_ids: Vec::new(),
            kms_key_id: None,
            volume_type: default_volume_type(),
            snapshot_selection: SnapshotSelection::default(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            poll_timeout_seconds: None,
        }
    }
}

impl Config {
    pub fn encode_yaml(&self) -> io::Result<String> {
        serde_yaml::to_string(&self).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to serialize Config to YAML {}", e),
            )
        })
    }

    /// Saves the current configuration to disk
    /// and overwrites the file.
    pub fn sync(&self, file_path: &str) -> io::Result<()> {
        log::info!("syncing Config to '{}'", file_path);
        let path = Path::new(file_path);
        if let Some(parent_dir) = path.parent() {
            if !parent_dir.as_os_str().is_empty() {
                fs::create_dir_all(parent_dir)?;
            }
        }

        let d = self.encode_yaml()?;
        let mut f = File::create(file_path)?;
        f.write_all(d.as_bytes())?;
        Ok(())
    }

    pub fn load(file_path: &str) -> io::Result<Self> {
        log::info!("loading Config from {}", file_path);

        if !Path::new(file_path).exists() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("file {} does not exists", file_path),
            ));
        }

        let f = File::open(file_path).map_err(|e| {
            Error::new(
                ErrorKind::Other,
                format!("failed to open {} ({})", file_path, e),
            )
        })?;
        serde_yaml::from_reader(f)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("invalid YAML: {}", e)))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> io::Result<()> {
        log::info!("validating Config");

        if self.region.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "empty region"));
        }
        if self.volume_type.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "empty volume_type"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "poll_interval_seconds must be >0",
            ));
        }
        for id in self.instance_ids.iter() {
            if !id.starts_with("i-") {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("invalid instance Id '{}'", id),
                ));
            }
        }

        Ok(())
    }

    pub fn poller(&self) -> Poller {
        let p = Poller::unbounded(Duration::from_secs(self.poll_interval_seconds));
        match self.poll_timeout_seconds {
            Some(t) => p.with_timeout(Duration::from_secs(t)),
            None => p,
        }
    }
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- config::test_config --exact --show-output
#[test]
fn test_config() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut cfg = Config::default();
    cfg.instance_ids = vec![String::from("i-abcd1234"), String::from("i-abcd5678")];
    cfg.kms_key_id = Some(String::from(
        "arn:aws:kms:us-west-2:123456789012:key/12345678-1234-abcd-5678-abcd1234",
    ));
    cfg.snapshot_selection = SnapshotSelection::MostRecent;
    cfg.validate().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("nested").join("ebs.yaml");
    let p = p.as_os_str().to_str().unwrap();
    cfg.sync(p).unwrap();

    let loaded = Config::load(p).unwrap();
    assert_eq!(cfg, loaded);

    let contents = fs::read_to_string(p).unwrap();
    assert!(contents.contains("snapshot_selection: most-recent"));

    assert!(Config::load(&format!("{}.missing", p)).is_err());
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- config::test_config_defaults --exact --show-output
#[test]
fn test_config_defaults() {
    let cfg: Config = serde_yaml::from_str("instance_ids: [i-abcd1234]\n").unwrap();
    assert_eq!(cfg.region, DEFAULT_REGION);
    assert_eq!(cfg.volume_type, DEFAULT_VOLUME_TYPE);
    assert_eq!(cfg.snapshot_selection, SnapshotSelection::FirstMatch);
    assert_eq!(cfg.poller(), Poller::unbounded(Duration::from_secs(2)));

    let bad: Config = serde_yaml::from_str("instance_ids: [vol-abcd1234]\n").unwrap();
    assert!(bad.validate().is_err());

    let zero: Config = serde_yaml::from_str("poll_interval_seconds: 0\n").unwrap();
    assert!(zero.validate().is_err());

    let bounded: Config = serde_yaml::from_str("poll_timeout_seconds: 600\n").unwrap();
    assert_eq!(bounded.poller().timeout, Some(Duration::from_secs(600)));
}
