use std::io::Write;

use crate::{
    console,
    ec2::{self, Api, Instance, Snapshot},
    errors::Result,
};

/// Snapshots taken for one instance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SnapshotOutcome {
    pub instance_id: String,
    pub availability_zone: String,
    pub snapshots: Vec<Snapshot>,
    /// Snapshot Ids with FSR enabled in the instance's availability zone.
    pub fsr_enabled: Vec<String>,
    /// Set if an FSR failure cut the instance's remaining volumes.
    pub fsr_failed: Option<String>,
}

/// Creates a tagged snapshot of every volume attached to each instance and
/// enables fast snapshot restore for it in the instance's availability zone.
///
/// An unsuccessful FSR result abandons the instance's remaining volumes and
/// moves on to the next instance. Nothing is deduplicated: every run creates
/// new snapshots. An empty instance list is rejected before any call.
pub async fn create_snapshots<A, W>(
    api: &A,
    instance_ids: &[String],
    out: &mut W,
) -> Result<Vec<SnapshotOutcome>>
where
    A: Api + ?Sized,
    W: Write,
{
    ec2::check_instance_ids(instance_ids)?;
    log::info!("creating snapshots for {} instances", instance_ids.len());
    let instances = api.describe_instances(instance_ids).await?;

    let mut outcomes = Vec::with_capacity(instances.len());
    for instance in instances.iter() {
        outcomes.push(create_instance_snapshots(api, instance, out).await?);
    }
    Ok(outcomes)
}

async fn create_instance_snapshots<A, W>(
    api: &A,
    instance: &Instance,
    out: &mut W,
) -> Result<SnapshotOutcome>
where
    A: Api + ?Sized,
    W: Write,
{
    let instance_id = instance.instance_id.as_str();
    let az = instance.availability_zone.as_str();

    console::header(out, &format!("===== Checking {} =====", instance_id))?;
    writeln!(out, "{}", az)?;
    for bd in instance.block_devices.iter() {
        writeln!(out, "{} {}", bd.device_name, bd.volume_id)?;
    }

    let mut outcome = SnapshotOutcome {
        instance_id: instance_id.to_string(),
        availability_zone: az.to_string(),
        snapshots: Vec::new(),
        fsr_enabled: Vec::new(),
        fsr_failed: None,
    };

    let volumes = api.describe_instance_volumes(instance_id).await?;
    let description = format!("for instance {}", instance_id);
    for volume in volumes.iter() {
        let snapshot = api
            .create_snapshot(&volume.volume_id, instance_id, &description)
            .await?;
        writeln!(
            out,
            "Snapshot {} is created for {}",
            snapshot.snapshot_id, snapshot.volume_id
        )?;
        let snapshot_id = snapshot.snapshot_id.clone();
        outcome.snapshots.push(snapshot);

        let enabled = api.enable_fast_snapshot_restore(&snapshot_id, az).await?;
        if !enabled.successful {
            log::warn!(
                "failed to enable FSR for '{}' on '{}' {:?}",
                snapshot_id,
                az,
                enabled.errors
            );
            writeln!(
                out,
                "Something went wrong enabling FSR for {} on {}! Skipping the rest of {}...",
                snapshot_id, az, instance_id
            )?;
            outcome.fsr_failed = Some(snapshot_id);
            break;
        }
        writeln!(out, "Snapshot {} enabled FSR on {}", snapshot_id, az)?;
        outcome.fsr_enabled.push(snapshot_id);
    }

    Ok(outcome)
}
