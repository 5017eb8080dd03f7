use std::io::Write;

use crate::{
    console,
    ec2::{self, Api, FastSnapshotRestore, FastSnapshotRestoreState, Instance, Snapshot},
    errors::Result,
};
use chrono::{DateTime, Utc};

/// Fast snapshot restore status of a single snapshot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FsrStatus {
    /// No FSR record exists for the snapshot.
    NotEnabled,
    Enabled {
        optimizing_time: Option<DateTime<Utc>>,
        enabled_time: Option<DateTime<Utc>>,
    },
    /// Any state other than "enabled", e.g., "enabling" or "optimizing".
    InState {
        state: FastSnapshotRestoreState,
        optimizing_time: Option<DateTime<Utc>>,
    },
}

impl FsrStatus {
    /// Picks the record for the availability zone, or the first record if
    /// the snapshot has none in that zone.
    pub fn from_records(records: &[FastSnapshotRestore], availability_zone: &str) -> Self {
        let rec = records
            .iter()
            .find(|r| r.availability_zone == availability_zone)
            .or_else(|| records.first());
        match rec {
            None => FsrStatus::NotEnabled,
            Some(r) if r.state == FastSnapshotRestoreState::Enabled => FsrStatus::Enabled {
                optimizing_time: r.optimizing_time,
                enabled_time: r.enabled_time,
            },
            Some(r) => FsrStatus::InState {
                state: r.state.clone(),
                optimizing_time: r.optimizing_time,
            },
        }
    }

    pub fn describe(&self, snapshot_id: &str) -> String {
        match self {
            FsrStatus::NotEnabled => format!("{} FSR is not enabled", snapshot_id),
            FsrStatus::Enabled {
                optimizing_time,
                enabled_time,
            } => format!(
                "{} FSR is enabled with OptimizingTime {} and EnabledTime {}",
                snapshot_id,
                console::hms(optimizing_time.as_ref()),
                console::hms(enabled_time.as_ref())
            ),
            FsrStatus::InState {
                state,
                optimizing_time: Some(t),
            } => format!(
                "{} FSR is in {} state with OptimizingTime {}",
                snapshot_id,
                state,
                console::hms(Some(t))
            ),
            FsrStatus::InState { state, .. } => {
                format!("{} FSR is in {} state", snapshot_id, state)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SnapshotStatus {
    pub snapshot: Snapshot,
    pub fsr: FsrStatus,
}

/// Prints the placement, device mapping and snapshot status of each
/// instance. Issues no mutating calls. An empty instance list is rejected.
pub async fn report<A, W>(
    api: &A,
    instance_ids: &[String],
    out: &mut W,
) -> Result<Vec<(Instance, Vec<SnapshotStatus>)>>
where
    A: Api + ?Sized,
    W: Write,
{
    ec2::check_instance_ids(instance_ids)?;
    let instances = api.describe_instances(instance_ids).await?;
    let mut reports = Vec::with_capacity(instances.len());
    for instance in instances.into_iter() {
        console::header(
            out,
            &format!("===== Checking {} =====", instance.instance_id),
        )?;
        let statuses = report_instance(api, &instance, out).await?;
        reports.push((instance, statuses));
    }
    Ok(reports)
}

/// Prints the status lines of a single instance, e.g.,
///
/// us-west-2a
/// /dev/xvda vol-aaa
/// snap-aaa 100% vol-aaa 8 12:06:19
/// snap-aaa FSR is enabled with OptimizingTime 12:06:37 and EnabledTime 12:07:03
pub async fn report_instance<A, W>(
    api: &A,
    instance: &Instance,
    out: &mut W,
) -> Result<Vec<SnapshotStatus>>
where
    A: Api + ?Sized,
    W: Write,
{
    writeln!(out, "{}", instance.availability_zone)?;
    for bd in instance.block_devices.iter() {
        writeln!(out, "{} {}", bd.device_name, bd.volume_id)?;
    }

    let snapshots = api
        .describe_instance_snapshots(&instance.instance_id)
        .await?;
    let mut statuses = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots.into_iter() {
        writeln!(
            out,
            "{} {} {} {} {}",
            snapshot.snapshot_id,
            snapshot.progress,
            snapshot.volume_id,
            snapshot.volume_size,
            console::hms(snapshot.start_time.as_ref())
        )?;

        let records = api
            .describe_fast_snapshot_restores(&snapshot.snapshot_id)
            .await?;
        let fsr = FsrStatus::from_records(&records, &instance.availability_zone);
        writeln!(out, "{}", fsr.describe(&snapshot.snapshot_id))?;

        statuses.push(SnapshotStatus { snapshot, fsr });
    }
    Ok(statuses)
}
