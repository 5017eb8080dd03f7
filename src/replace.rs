use std::{collections::HashMap, io::Write};

use crate::{
    config::SnapshotSelection,
    console,
    ec2::{
        self, Api, BlockDevice, CreateVolumeRequest, Snapshot, Volume, VolumeState,
        INSTANCE_TAG_KEY, ORIGINAL_VOLUME_TAG_KEY,
    },
    errors::Result,
    poll::Poller,
    prompt::Confirm,
    status,
};

/// Indexes the snapshots taken for an instance by their source volume,
/// keeping the provider listing order within each volume.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
    by_volume: HashMap<String, Vec<Snapshot>>,
}

impl SnapshotIndex {
    pub fn new<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        let mut by_volume: HashMap<String, Vec<Snapshot>> = HashMap::new();
        for s in snapshots {
            by_volume
                .entry(s.volume_id.clone())
                .or_default()
                .push(s.clone());
        }
        Self { by_volume }
    }

    /// Returns the snapshot to restore the volume from, if any was taken.
    pub fn select(&self, volume_id: &str, selection: SnapshotSelection) -> Option<&Snapshot> {
        let candidates = self.by_volume.get(volume_id)?;
        match selection {
            SnapshotSelection::FirstMatch => candidates.first(),
            // "max_by_key" keeps the last maximum, so walk in reverse to
            // keep the earliest listed one on ties
            SnapshotSelection::MostRecent => candidates
                .iter()
                .rev()
                .max_by_key(|s| s.start_time)
                .or_else(|| candidates.first()),
        }
    }
}

/// Volume replacement settings.
#[derive(Debug, Clone)]
pub struct Options {
    /// Uses the account default EBS key if none.
    pub kms_key_id: Option<String>,
    pub volume_type: String,
    pub selection: SnapshotSelection,
    pub poller: Poller,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Replacement {
    pub device_name: String,
    pub old_volume_id: String,
    pub new_volume_id: String,
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ReplaceOutcome {
    /// False if the operator declined to start.
    pub started: bool,
    pub replaced: Vec<Replacement>,
    /// Devices left untouched because no snapshot was taken from their volume.
    pub unmatched: Vec<BlockDevice>,
    /// Device at which the operator stopped the loop.
    pub declined_at: Option<String>,
    pub final_devices: Vec<BlockDevice>,
    pub final_volumes: Vec<Volume>,
}

/// Replaces every attached volume of the instance with a new volume restored
/// from its tagged snapshot, asking the operator before starting and before
/// each device.
///
/// Devices are handled one by one: create the volume, wait until available,
/// detach the old volume, wait until available, attach the new volume on the
/// same device, wait until in-use. Replaced devices stay replaced if a later
/// device fails or is declined. The latest device mapping and volume status
/// are reported even if the operator declines to start.
pub async fn replace_volumes<A, C, W>(
    api: &A,
    instance_id: &str,
    opts: &Options,
    confirm: &mut C,
    out: &mut W,
) -> Result<ReplaceOutcome>
where
    A: Api + ?Sized,
    C: Confirm + ?Sized,
    W: Write,
{
    let instance = ec2::describe_instance(api, instance_id).await?;
    console::header(out, &format!("===== Checking {} =====", instance_id))?;
    let statuses = status::report_instance(api, &instance, out).await?;
    let index = SnapshotIndex::new(statuses.iter().map(|s| &s.snapshot));

    if !instance.is_stopped() {
        log::warn!(
            "instance '{}' is '{}', not stopped",
            instance_id,
            instance.state
        );
        console::warn(out, "!!! Please stop the instance before moving on !!!")?;
    }

    let started = confirm.confirm("Moving on to create the volumes?")?;
    let mut outcome = ReplaceOutcome {
        started,
        ..Default::default()
    };
    let devices = if started {
        console::header(
            out,
            &format!("===== {} - {} =====", instance_id, instance.state),
        )?;
        writeln!(out, "=== Current block device mapping ===")?;
        for bd in instance.block_devices.iter() {
            writeln!(out, "{} {}", bd.device_name, bd.volume_id)?;
        }
        instance.block_devices.as_slice()
    } else {
        writeln!(out, "Aborted; no volume was changed.")?;
        &[]
    };

    for device in devices.iter() {
        writeln!(
            out,
            "\nAbout to replace {} on {}",
            device.volume_id, device.device_name
        )?;
        if !confirm.confirm("Moving on?")? {
            log::info!("stopping before '{}'", device.device_name);
            outcome.declined_at = Some(device.device_name.clone());
            break;
        }

        let snapshot = match index.select(&device.volume_id, opts.selection) {
            Some(s) => s,
            None => {
                log::warn!("no snapshot found for '{}'", device.volume_id);
                writeln!(
                    out,
                    "No snapshot is taken from {}; leaving {} as is",
                    device.volume_id, device.device_name
                )?;
                outcome.unmatched.push(device.clone());
                continue;
            }
        };
        writeln!(
            out,
            "{} is taken from {}",
            snapshot.snapshot_id, snapshot.volume_id
        )?;

        let replacement = replace_device(
            api,
            instance_id,
            &instance.availability_zone,
            device,
            snapshot,
            opts,
            out,
        )
        .await?;
        writeln!(
            out,
            "\nSuccessfully replaced {} with newly created {}",
            replacement.old_volume_id, replacement.new_volume_id
        )?;
        outcome.replaced.push(replacement);
    }

    let latest = ec2::describe_instance(api, instance_id).await?;
    writeln!(out, "\n=== Latest block device mapping ===")?;
    for bd in latest.block_devices.iter() {
        writeln!(out, "{} {}", bd.device_name, bd.volume_id)?;
    }

    let volumes = api.describe_instance_volumes(instance_id).await?;
    writeln!(out, "\n=== Latest volume status ===")?;
    for v in volumes.iter() {
        writeln!(
            out,
            "{}, fast_restored = {}, size = {}, state = {}",
            v.volume_id, v.fast_restored, v.size, v.state
        )?;
    }

    outcome.final_devices = latest.block_devices;
    outcome.final_volumes = volumes;
    Ok(outcome)
}

async fn replace_device<A, W>(
    api: &A,
    instance_id: &str,
    availability_zone: &str,
    device: &BlockDevice,
    snapshot: &Snapshot,
    opts: &Options,
    out: &mut W,
) -> Result<Replacement>
where
    A: Api + ?Sized,
    W: Write,
{
    writeln!(out, "\nCreating a volume based on the snapshot.")?;
    let req = CreateVolumeRequest {
        availability_zone: availability_zone.to_string(),
        snapshot_id: snapshot.snapshot_id.clone(),
        volume_type: opts.volume_type.clone(),
        encrypted: true,
        kms_key_id: opts.kms_key_id.clone(),
        tags: vec![
            (
                ORIGINAL_VOLUME_TAG_KEY.to_string(),
                device.volume_id.clone(),
            ),
            (INSTANCE_TAG_KEY.to_string(), instance_id.to_string()),
        ],
    };
    let new_volume_id = api.create_volume(&req).await?;
    wait_for_state(
        api,
        &opts.poller,
        &new_volume_id,
        VolumeState::Available,
        out,
    )
    .await?;
    writeln!(out, "{} created!", new_volume_id)?;

    writeln!(out, "\nDetaching volume {}", device.volume_id)?;
    api.detach_volume(instance_id, &device.volume_id).await?;
    wait_for_state(
        api,
        &opts.poller,
        &device.volume_id,
        VolumeState::Available,
        out,
    )
    .await?;
    writeln!(out, "{} detached!", device.volume_id)?;

    writeln!(
        out,
        "\nAttaching volume {} on {}",
        new_volume_id, device.device_name
    )?;
    api.attach_volume(instance_id, &new_volume_id, &device.device_name)
        .await?;
    wait_for_state(
        api,
        &opts.poller,
        &new_volume_id,
        VolumeState::InUse,
        out,
    )
    .await?;
    writeln!(out, "{} attached!", new_volume_id)?;

    Ok(Replacement {
        device_name: device.device_name.clone(),
        old_volume_id: device.volume_id.clone(),
        new_volume_id,
        snapshot_id: snapshot.snapshot_id.clone(),
    })
}

/// Describes the volume until it reaches the target state,
/// printing each intermediate state.
async fn wait_for_state<A, W>(
    api: &A,
    poller: &Poller,
    volume_id: &str,
    target: VolumeState,
    out: &mut W,
) -> Result<Volume>
where
    A: Api + ?Sized,
    W: Write,
{
    log::info!("waiting for '{}' to be '{}'", volume_id, target);
    let mut write_err = None;
    let ret = poller
        .until(
            move || api.describe_volume(volume_id),
            |v: &Volume| {
                if v.state == target {
                    return true;
                }
                if let Err(e) = writeln!(out, "{} is still {}", v.volume_id, v.state) {
                    write_err.get_or_insert(e);
                }
                false
            },
        )
        .await;
    if let Some(e) = write_err {
        return Err(e.into());
    }
    ret
}
