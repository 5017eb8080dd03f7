use crate::{
    ec2::{
        check_instance_ids, Api, BlockDevice, CreateVolumeRequest, FastSnapshotRestore,
        FastSnapshotRestoreState, FsrEnableResult, Instance, Snapshot, Volume, VolumeState,
        INSTANCE_TAG_KEY,
    },
    errors::{api_err, Error, Result},
};
use async_trait::async_trait;
use aws_sdk_ec2::{
    operation::enable_fast_snapshot_restores::EnableFastSnapshotRestoresOutput,
    types::{self as aws, Filter, ResourceType, Tag, TagSpecification, VolumeType},
    Client,
};
use aws_smithy_types::DateTime as SmithyDateTime;
use aws_types::SdkConfig as AwsSdkConfig;
use chrono::{DateTime, TimeZone, Utc};

/// Implements AWS EC2 manager for the EBS workflows.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    pub cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        Self {
            region: shared_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            cli: Client::new(shared_config),
        }
    }
}

#[async_trait]
impl Api for Manager {
    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeInstances.html>
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Instance>> {
        check_instance_ids(instance_ids)?;
        log::info!(
            "describing instances {:?} in '{}'",
            instance_ids,
            self.region
        );
        let resp = self
            .cli
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(|e| api_err("describe_instances", e))?;

        let mut instances = Vec::new();
        if let Some(reservations) = resp.reservations() {
            for rsv in reservations {
                if let Some(insts) = rsv.instances() {
                    for inst in insts {
                        instances.push(convert_instance(inst));
                    }
                }
            }
        }
        log::info!("described {} instances", instances.len());
        Ok(instances)
    }

    /// Describes all attached volumes by the instance Id.
    ///
    /// e.g.,
    /// aws ec2 describe-volumes \
    /// --filters Name=attachment.instance-id,Values=$INSTANCE_ID
    ///
    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeVolumes.html>
    async fn describe_instance_volumes(&self, instance_id: &str) -> Result<Vec<Volume>> {
        log::info!("filtering volumes via instance Id {}", instance_id);
        let resp = self
            .cli
            .describe_volumes()
            .filters(
                Filter::builder()
                    .name("attachment.instance-id")
                    .values(instance_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("describe_volumes", e))?;

        let volumes: Vec<Volume> = resp
            .volumes()
            .unwrap_or_default()
            .iter()
            .map(convert_volume)
            .collect();
        log::info!("described {} volumes", volumes.len());
        Ok(volumes)
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume> {
        log::debug!("describing volume {}", volume_id);
        let resp = self
            .cli
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
            .map_err(|e| api_err("describe_volumes", e))?;

        match resp.volumes().and_then(|vs| vs.first()) {
            Some(v) => Ok(convert_volume(v)),
            None => Err(Error::API {
                message: format!("volume '{}' not found", volume_id),
                retryable: false,
            }),
        }
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_CreateSnapshot.html>
    async fn create_snapshot(
        &self,
        volume_id: &str,
        instance_id: &str,
        description: &str,
    ) -> Result<Snapshot> {
        log::info!("creating snapshot for '{}' of '{}'", volume_id, instance_id);
        let resp = self
            .cli
            .create_snapshot()
            .volume_id(volume_id)
            .description(description)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Snapshot)
                    .tags(
                        Tag::builder()
                            .key(INSTANCE_TAG_KEY)
                            .value(instance_id)
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("create_snapshot", e))?;

        let snapshot_id = match resp.snapshot_id() {
            Some(v) => v.to_string(),
            None => {
                return Err(Error::API {
                    message: String::from("empty snapshot Id from create_snapshot response"),
                    retryable: false,
                });
            }
        };
        log::info!("created snapshot '{}' for '{}'", snapshot_id, volume_id);

        Ok(Snapshot {
            snapshot_id,
            volume_id: resp.volume_id().unwrap_or(volume_id).to_string(),
            volume_size: resp.volume_size().unwrap_or(0),
            progress: resp.progress().unwrap_or("").to_string(),
            start_time: resp.start_time().and_then(to_utc),
        })
    }

    /// e.g.,
    /// aws ec2 describe-snapshots --filters Name=tag:instance,Values=$INSTANCE_ID
    async fn describe_instance_snapshots(&self, instance_id: &str) -> Result<Vec<Snapshot>> {
        log::info!(
            "filtering snapshots via tag {}={}",
            INSTANCE_TAG_KEY,
            instance_id
        );
        let resp = self
            .cli
            .describe_snapshots()
            .filters(
                Filter::builder()
                    .name(format!("tag:{}", INSTANCE_TAG_KEY))
                    .values(instance_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("describe_snapshots", e))?;

        let snapshots: Vec<Snapshot> = resp
            .snapshots()
            .unwrap_or_default()
            .iter()
            .map(|s| Snapshot {
                snapshot_id: s.snapshot_id().unwrap_or("").to_string(),
                volume_id: s.volume_id().unwrap_or("").to_string(),
                volume_size: s.volume_size().unwrap_or(0),
                progress: s.progress().unwrap_or("").to_string(),
                start_time: s.start_time().and_then(to_utc),
            })
            .collect();
        log::info!(
            "described {} snapshots for '{}'",
            snapshots.len(),
            instance_id
        );
        Ok(snapshots)
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_EnableFastSnapshotRestores.html>
    async fn enable_fast_snapshot_restore(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
    ) -> Result<FsrEnableResult> {
        log::info!(
            "enabling fast snapshot restore for '{}' in '{}'",
            snapshot_id,
            availability_zone
        );
        let resp = self
            .cli
            .enable_fast_snapshot_restores()
            .availability_zones(availability_zone)
            .source_snapshot_ids(snapshot_id)
            .send()
            .await
            .map_err(|e| api_err("enable_fast_snapshot_restores", e))?;

        let enabled = convert_fsr_enable(&resp, snapshot_id, availability_zone);
        if !enabled.errors.is_empty() {
            log::warn!("fast snapshot restore errors {:?}", enabled.errors);
        }
        Ok(enabled)
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DescribeFastSnapshotRestores.html>
    async fn describe_fast_snapshot_restores(
        &self,
        snapshot_id: &str,
    ) -> Result<Vec<FastSnapshotRestore>> {
        log::info!("describing fast snapshot restores for '{}'", snapshot_id);
        let resp = self
            .cli
            .describe_fast_snapshot_restores()
            .filters(
                Filter::builder()
                    .name("snapshot-id")
                    .values(snapshot_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("describe_fast_snapshot_restores", e))?;

        Ok(resp
            .fast_snapshot_restores()
            .unwrap_or_default()
            .iter()
            .map(|r| FastSnapshotRestore {
                snapshot_id: r.snapshot_id().unwrap_or(snapshot_id).to_string(),
                availability_zone: r.availability_zone().unwrap_or("").to_string(),
                state: r
                    .state()
                    .map(|s| FastSnapshotRestoreState::from(s.as_str()))
                    .unwrap_or_else(|| {
                        FastSnapshotRestoreState::Unknown(String::from("unknown"))
                    }),
                optimizing_time: r.optimizing_time().and_then(to_utc),
                enabled_time: r.enabled_time().and_then(to_utc),
            })
            .collect())
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_CreateVolume.html>
    async fn create_volume(&self, req: &CreateVolumeRequest) -> Result<String> {
        log::info!(
            "creating {} volume from '{}' in '{}'",
            req.volume_type,
            req.snapshot_id,
            req.availability_zone
        );

        let mut tag_spec = TagSpecification::builder().resource_type(ResourceType::Volume);
        for (k, v) in req.tags.iter() {
            tag_spec = tag_spec.tags(Tag::builder().key(k).value(v).build());
        }

        let resp = self
            .cli
            .create_volume()
            .availability_zone(&req.availability_zone)
            .snapshot_id(&req.snapshot_id)
            .volume_type(VolumeType::from(req.volume_type.as_str()))
            .encrypted(req.encrypted)
            .set_kms_key_id(req.kms_key_id.clone())
            .tag_specifications(tag_spec.build())
            .send()
            .await
            .map_err(|e| api_err("create_volume", e))?;

        match resp.volume_id() {
            Some(v) => {
                log::info!("created volume '{}'", v);
                Ok(v.to_string())
            }
            None => Err(Error::API {
                message: String::from("empty volume Id from create_volume response"),
                retryable: false,
            }),
        }
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_DetachVolume.html>
    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> Result<()> {
        log::info!("detaching volume '{}' from '{}'", volume_id, instance_id);
        self.cli
            .detach_volume()
            .instance_id(instance_id)
            .volume_id(volume_id)
            .send()
            .await
            .map_err(|e| api_err("detach_volume", e))?;
        Ok(())
    }

    /// ref. <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/API_AttachVolume.html>
    async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()> {
        log::info!(
            "attaching volume '{}' to '{}' on '{}'",
            volume_id,
            instance_id,
            device
        );
        self.cli
            .attach_volume()
            .instance_id(instance_id)
            .volume_id(volume_id)
            .device(device)
            .send()
            .await
            .map_err(|e| api_err("attach_volume", e))?;
        Ok(())
    }
}

fn convert_instance(inst: &aws::Instance) -> Instance {
    let state = inst
        .state()
        .and_then(|s| s.name())
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| String::from("unknown"));

    let availability_zone = inst
        .placement()
        .and_then(|p| p.availability_zone())
        .unwrap_or("")
        .to_string();

    // instance store devices carry no EBS volume
    let mut block_devices = Vec::new();
    for m in inst.block_device_mappings().unwrap_or_default() {
        if let (Some(device_name), Some(volume_id)) =
            (m.device_name(), m.ebs().and_then(|e| e.volume_id()))
        {
            block_devices.push(BlockDevice::new(device_name, volume_id));
        }
    }

    Instance {
        instance_id: inst.instance_id().unwrap_or("").to_string(),
        state,
        availability_zone,
        block_devices,
    }
}

fn convert_volume(v: &aws::Volume) -> Volume {
    Volume {
        volume_id: v.volume_id().unwrap_or("").to_string(),
        size: v.size().unwrap_or(0),
        state: v
            .state()
            .map(|s| VolumeState::from(s.as_str()))
            .unwrap_or_else(|| VolumeState::Unknown(String::from("unknown"))),
        availability_zone: v.availability_zone().unwrap_or("").to_string(),
        kms_key_id: v.kms_key_id().map(String::from),
        fast_restored: v.fast_restored().unwrap_or(false),
    }
}

/// Successful only if the snapshot is listed in "Successful".
/// Every state error of the "Unsuccessful" items becomes one message.
fn convert_fsr_enable(
    resp: &EnableFastSnapshotRestoresOutput,
    snapshot_id: &str,
    availability_zone: &str,
) -> FsrEnableResult {
    let successful = !resp.successful().unwrap_or_default().is_empty();

    let mut errors = Vec::new();
    for item in resp.unsuccessful().unwrap_or_default() {
        for se in item.fast_snapshot_restore_state_errors().unwrap_or_default() {
            let (code, message) = match se.error() {
                Some(err) => (err.code().unwrap_or(""), err.message().unwrap_or("")),
                None => ("", ""),
            };
            errors.push(format!(
                "{} in {}: {} {}",
                item.snapshot_id().unwrap_or(snapshot_id),
                se.availability_zone().unwrap_or(availability_zone),
                code,
                message
            ));
        }
    }

    FsrEnableResult { successful, errors }
}

fn to_utc(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(dt.secs(), dt.subsec_nanos()).single()
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- ec2::manager::test_convert_instance --exact --show-output
#[test]
fn test_convert_instance() {
    use aws_sdk_ec2::types::{
        EbsInstanceBlockDevice, InstanceBlockDeviceMapping, InstanceState, InstanceStateName,
        Placement,
    };

    let inst = aws::Instance::builder()
        .instance_id("i-abcd1234")
        .state(
            InstanceState::builder()
                .name(InstanceStateName::Stopped)
                .build(),
        )
        .placement(Placement::builder().availability_zone("us-west-2c").build())
        .block_device_mappings(
            InstanceBlockDeviceMapping::builder()
                .device_name("/dev/xvda")
                .ebs(
                    EbsInstanceBlockDevice::builder()
                        .volume_id("vol-aaa")
                        .build(),
                )
                .build(),
        )
        .block_device_mappings(
            InstanceBlockDeviceMapping::builder()
                .device_name("/dev/sdb")
                .ebs(
                    EbsInstanceBlockDevice::builder()
                        .volume_id("vol-ccc")
                        .build(),
                )
                .build(),
        )
        .build();

    let converted = convert_instance(&inst);
    assert_eq!(converted.instance_id, "i-abcd1234");
    assert!(converted.is_stopped());
    assert_eq!(converted.availability_zone, "us-west-2c");
    assert_eq!(
        converted.block_devices,
        vec![
            BlockDevice::new("/dev/xvda", "vol-aaa"),
            BlockDevice::new("/dev/sdb", "vol-ccc"),
        ]
    );
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- ec2::manager::test_convert_volume --exact --show-output
#[test]
fn test_convert_volume() {
    let v = aws::Volume::builder()
        .volume_id("vol-eee")
        .size(32)
        .state(aws::VolumeState::InUse)
        .fast_restored(true)
        .build();
    let converted = convert_volume(&v);
    assert_eq!(converted.volume_id, "vol-eee");
    assert_eq!(converted.size, 32);
    assert_eq!(converted.state, VolumeState::InUse);
    assert!(converted.fast_restored);
    assert!(converted.kms_key_id.is_none());

    let dt = SmithyDateTime::from_secs(1_600_000_000);
    assert_eq!(to_utc(&dt).map(|d| d.timestamp()), Some(1_600_000_000));
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- ec2::manager::test_convert_fsr_enable --exact --show-output
#[test]
fn test_convert_fsr_enable() {
    use aws_sdk_ec2::types::{
        EnableFastSnapshotRestoreErrorItem, EnableFastSnapshotRestoreStateError,
        EnableFastSnapshotRestoreStateErrorItem, EnableFastSnapshotRestoreSuccessItem,
    };

    let ok = EnableFastSnapshotRestoresOutput::builder()
        .successful(
            EnableFastSnapshotRestoreSuccessItem::builder()
                .snapshot_id("snap-aaa")
                .availability_zone("us-west-2c")
                .build(),
        )
        .build();
    let converted = convert_fsr_enable(&ok, "snap-aaa", "us-west-2c");
    assert!(converted.successful);
    assert!(converted.errors.is_empty());

    let failed = EnableFastSnapshotRestoresOutput::builder()
        .unsuccessful(
            EnableFastSnapshotRestoreErrorItem::builder()
                .snapshot_id("snap-aaa")
                .fast_snapshot_restore_state_errors(
                    EnableFastSnapshotRestoreStateErrorItem::builder()
                        .availability_zone("us-west-2c")
                        .error(
                            EnableFastSnapshotRestoreStateError::builder()
                                .code("InvalidParameterValue")
                                .message("quota exceeded")
                                .build(),
                        )
                        .build(),
                )
                .build(),
        )
        .build();
    let converted = convert_fsr_enable(&failed, "snap-aaa", "us-west-2c");
    assert!(!converted.successful);
    assert_eq!(
        converted.errors,
        vec![String::from(
            "snap-aaa in us-west-2c: InvalidParameterValue quota exceeded"
        )]
    );

    // neither list set
    let empty = EnableFastSnapshotRestoresOutput::builder().build();
    let converted = convert_fsr_enable(&empty, "snap-aaa", "us-west-2c");
    assert!(!converted.successful);
    assert!(converted.errors.is_empty());
}
