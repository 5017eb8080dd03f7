pub mod manager;

#[cfg(test)]
pub mod fake;

use std::fmt;

use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use manager::Manager;

/// Tag key that links a snapshot (and a restored volume) to its instance.
pub const INSTANCE_TAG_KEY: &str = "instance";

/// Tag key that records which volume a restored volume replaces.
pub const ORIGINAL_VOLUME_TAG_KEY: &str = "original_volume";

/// Represents the EC2 provider surface used by the EBS workflows.
/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/OperationList-query-ebs.html>
#[async_trait]
pub trait Api: Send + Sync {
    /// Describes the instances in the order returned by the provider.
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Instance>>;

    /// Describes all volumes attached to the instance.
    async fn describe_instance_volumes(&self, instance_id: &str) -> Result<Vec<Volume>>;

    /// Describes a single volume by its Id.
    async fn describe_volume(&self, volume_id: &str) -> Result<Volume>;

    /// Creates a snapshot of the volume, tagged with the owning instance Id.
    async fn create_snapshot(
        &self,
        volume_id: &str,
        instance_id: &str,
        description: &str,
    ) -> Result<Snapshot>;

    /// Lists the snapshots tagged for the instance.
    async fn describe_instance_snapshots(&self, instance_id: &str) -> Result<Vec<Snapshot>>;

    /// Enables fast snapshot restore for the snapshot in a single availability zone.
    async fn enable_fast_snapshot_restore(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
    ) -> Result<FsrEnableResult>;

    /// Describes the fast snapshot restore records of the snapshot.
    async fn describe_fast_snapshot_restores(
        &self,
        snapshot_id: &str,
    ) -> Result<Vec<FastSnapshotRestore>>;

    /// Creates a volume and returns its Id.
    async fn create_volume(&self, req: &CreateVolumeRequest) -> Result<String>;

    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> Result<()>;

    async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()>;
}

/// Rejects an empty instance Id list, which the provider would otherwise
/// read as "every instance in the region".
pub fn check_instance_ids(instance_ids: &[String]) -> Result<()> {
    if instance_ids.is_empty() {
        return Err(Error::Other {
            message: String::from("no instance Id given"),
            retryable: false,
        });
    }
    Ok(())
}

/// Describes exactly one instance.
pub async fn describe_instance<A: Api + ?Sized>(
    api: &A,
    instance_id: &str,
) -> Result<Instance> {
    let instances = api.describe_instances(&[instance_id.to_string()]).await?;
    match instances.into_iter().next() {
        Some(inst) => Ok(inst),
        None => Err(Error::API {
            message: format!("instance '{}' not found", instance_id),
            retryable: false,
        }),
    }
}

/// Represents the underlying EC2 instance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Instance {
    pub instance_id: String,
    pub state: String,
    pub availability_zone: String,
    pub block_devices: Vec<BlockDevice>,
}

impl Instance {
    pub fn is_stopped(&self) -> bool {
        self.state == "stopped"
    }
}

/// Represents the association between a device name and the attached volume.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BlockDevice {
    pub device_name: String,
    pub volume_id: String,
}

impl BlockDevice {
    pub fn new(device_name: &str, volume_id: &str) -> Self {
        Self {
            device_name: String::from(device_name),
            volume_id: String::from(volume_id),
        }
    }
}

/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_Volume.html>
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Volume {
    pub volume_id: String,
    pub size: i32,
    pub state: VolumeState,
    pub availability_zone: String,
    pub kms_key_id: Option<String>,
    pub fast_restored: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
    Deleted,
    Error,
    Unknown(String),
}

impl VolumeState {
    pub fn as_str(&self) -> &str {
        match self {
            VolumeState::Creating => "creating",
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
            VolumeState::Deleting => "deleting",
            VolumeState::Deleted => "deleted",
            VolumeState::Error => "error",
            VolumeState::Unknown(s) => s.as_str(),
        }
    }
}

impl From<&str> for VolumeState {
    fn from(s: &str) -> Self {
        match s {
            "creating" => VolumeState::Creating,
            "available" => VolumeState::Available,
            "in-use" => VolumeState::InUse,
            "deleting" => VolumeState::Deleting,
            "deleted" => VolumeState::Deleted,
            "error" => VolumeState::Error,
            other => VolumeState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_Snapshot.html>
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub volume_id: String,
    pub volume_size: i32,
    /// e.g., "100%"
    pub progress: String,
    pub start_time: Option<DateTime<Utc>>,
}

/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeFastSnapshotRestoreSuccessItem.html>
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FastSnapshotRestore {
    pub snapshot_id: String,
    pub availability_zone: String,
    pub state: FastSnapshotRestoreState,
    pub optimizing_time: Option<DateTime<Utc>>,
    pub enabled_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FastSnapshotRestoreState {
    Enabling,
    Optimizing,
    Enabled,
    Disabling,
    Disabled,
    Unknown(String),
}

impl FastSnapshotRestoreState {
    pub fn as_str(&self) -> &str {
        match self {
            FastSnapshotRestoreState::Enabling => "enabling",
            FastSnapshotRestoreState::Optimizing => "optimizing",
            FastSnapshotRestoreState::Enabled => "enabled",
            FastSnapshotRestoreState::Disabling => "disabling",
            FastSnapshotRestoreState::Disabled => "disabled",
            FastSnapshotRestoreState::Unknown(s) => s.as_str(),
        }
    }
}

impl From<&str> for FastSnapshotRestoreState {
    fn from(s: &str) -> Self {
        match s {
            "enabling" => FastSnapshotRestoreState::Enabling,
            "optimizing" => FastSnapshotRestoreState::Optimizing,
            "enabled" => FastSnapshotRestoreState::Enabled,
            "disabling" => FastSnapshotRestoreState::Disabling,
            "disabled" => FastSnapshotRestoreState::Disabled,
            other => FastSnapshotRestoreState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for FastSnapshotRestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single-snapshot, single-AZ FSR enable request.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct FsrEnableResult {
    /// True if the provider listed the snapshot as successful.
    pub successful: bool,
    /// Error messages reported for the unsuccessful items.
    pub errors: Vec<String>,
}

/// Parameters for restoring a volume from a snapshot.
/// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_CreateVolume.html>
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CreateVolumeRequest {
    pub availability_zone: String,
    pub snapshot_id: String,
    pub volume_type: String,
    pub encrypted: bool,
    /// Uses the account default EBS key if none.
    pub kms_key_id: Option<String>,
    pub tags: Vec<(String, String)>,
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- ec2::test_states --exact --show-output
#[test]
fn test_states() {
    for s in [
        "creating",
        "available",
        "in-use",
        "deleting",
        "deleted",
        "error",
    ] {
        assert_eq!(VolumeState::from(s).as_str(), s);
    }
    assert_eq!(
        VolumeState::from("optimizing"),
        VolumeState::Unknown(String::from("optimizing"))
    );
    assert_eq!(VolumeState::InUse.to_string(), "in-use");

    for s in ["enabling", "optimizing", "enabled", "disabling", "disabled"] {
        assert_eq!(FastSnapshotRestoreState::from(s).as_str(), s);
    }
}
