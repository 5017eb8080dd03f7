use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use crate::{
    ec2::{
        Api, BlockDevice, CreateVolumeRequest, FastSnapshotRestore, FsrEnableResult, Instance,
        Snapshot, Volume, VolumeState,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;

/// Records every provider call made against the fake.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Call {
    DescribeInstances(Vec<String>),
    DescribeInstanceVolumes(String),
    DescribeVolume(String),
    CreateSnapshot {
        volume_id: String,
        instance_id: String,
    },
    DescribeInstanceSnapshots(String),
    EnableFastSnapshotRestore {
        snapshot_id: String,
        availability_zone: String,
    },
    DescribeFastSnapshotRestores(String),
    CreateVolume(CreateVolumeRequest),
    DetachVolume {
        instance_id: String,
        volume_id: String,
    },
    AttachVolume {
        instance_id: String,
        volume_id: String,
        device: String,
    },
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::CreateSnapshot { .. }
                | Call::EnableFastSnapshotRestore { .. }
                | Call::CreateVolume(_)
                | Call::DetachVolume { .. }
                | Call::AttachVolume { .. }
        )
    }
}

#[derive(Debug, Default)]
struct State {
    instances: Vec<Instance>,
    volumes: HashMap<String, Volume>,
    /// (instance Id tag, snapshot) in listing order
    snapshots: Vec<(String, Snapshot)>,
    fsr: Vec<FastSnapshotRestore>,
    /// volume states returned by the next describe_volume calls, before the stored state
    scripted: HashMap<String, VecDeque<VolumeState>>,
    /// volumes whose snapshots fail to enable FSR
    fsr_failing_volumes: HashSet<String>,
    /// states a newly created volume reports before "available"
    creating_polls: usize,
    calls: Vec<Call>,
    seq: usize,
}

/// In-memory EC2 backend.
#[derive(Debug, Default)]
pub struct Fake {
    state: Mutex<State>,
}

impl Fake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance with the volumes attached in the mapping order.
    pub fn add_instance(
        &self,
        instance_id: &str,
        az: &str,
        state: &str,
        devices: &[(&str, &str)],
    ) {
        let mut s = self.state.lock().unwrap();
        let mut block_devices = Vec::new();
        for (dev, vol) in devices {
            block_devices.push(BlockDevice::new(dev, vol));
            s.volumes.insert(
                vol.to_string(),
                Volume {
                    volume_id: vol.to_string(),
                    size: 8,
                    state: VolumeState::InUse,
                    availability_zone: az.to_string(),
                    kms_key_id: None,
                    fast_restored: false,
                },
            );
        }
        s.instances.push(Instance {
            instance_id: instance_id.to_string(),
            state: state.to_string(),
            availability_zone: az.to_string(),
            block_devices,
        });
    }

    pub fn add_snapshot(&self, instance_id: &str, snapshot: Snapshot) {
        let mut s = self.state.lock().unwrap();
        s.snapshots.push((instance_id.to_string(), snapshot));
    }

    pub fn add_fsr(&self, record: FastSnapshotRestore) {
        self.state.lock().unwrap().fsr.push(record);
    }

    pub fn fail_fsr_for_volume(&self, volume_id: &str) {
        let mut s = self.state.lock().unwrap();
        s.fsr_failing_volumes.insert(volume_id.to_string());
    }

    pub fn script_volume_states(&self, volume_id: &str, states: &[VolumeState]) {
        let mut s = self.state.lock().unwrap();
        s.scripted
            .entry(volume_id.to_string())
            .or_default()
            .extend(states.iter().cloned());
    }

    pub fn set_creating_polls(&self, n: usize) {
        self.state.lock().unwrap().creating_polls = n;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.is_mutating())
            .collect()
    }

    pub fn volume(&self, volume_id: &str) -> Option<Volume> {
        self.state.lock().unwrap().volumes.get(volume_id).cloned()
    }

    pub fn snapshots_for(&self, instance_id: &str) -> Vec<Snapshot> {
        let s = self.state.lock().unwrap();
        s.snapshots
            .iter()
            .filter(|(tag, _)| tag == instance_id)
            .map(|(_, snap)| snap.clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Api for Fake {
    async fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Instance>> {
        self.record(Call::DescribeInstances(instance_ids.to_vec()));
        let s = self.state.lock().unwrap();
        Ok(s.instances
            .iter()
            .filter(|i| instance_ids.contains(&i.instance_id))
            .cloned()
            .collect())
    }

    async fn describe_instance_volumes(&self, instance_id: &str) -> Result<Vec<Volume>> {
        self.record(Call::DescribeInstanceVolumes(instance_id.to_string()));
        let s = self.state.lock().unwrap();
        let mut volumes = Vec::new();
        if let Some(inst) = s.instances.iter().find(|i| i.instance_id == instance_id) {
            for bd in inst.block_devices.iter() {
                if let Some(v) = s.volumes.get(&bd.volume_id) {
                    volumes.push(v.clone());
                }
            }
        }
        Ok(volumes)
    }

    async fn describe_volume(&self, volume_id: &str) -> Result<Volume> {
        self.record(Call::DescribeVolume(volume_id.to_string()));
        let mut s = self.state.lock().unwrap();
        let scripted = s.scripted.get_mut(volume_id).and_then(|q| q.pop_front());
        match s.volumes.get(volume_id) {
            Some(v) => {
                let mut v = v.clone();
                if let Some(st) = scripted {
                    v.state = st;
                }
                Ok(v)
            }
            None => Err(Error::API {
                message: format!("volume '{}' not found", volume_id),
                retryable: false,
            }),
        }
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        instance_id: &str,
        _description: &str,
    ) -> Result<Snapshot> {
        self.record(Call::CreateSnapshot {
            volume_id: volume_id.to_string(),
            instance_id: instance_id.to_string(),
        });
        let mut s = self.state.lock().unwrap();
        s.seq += 1;
        let snapshot = Snapshot {
            snapshot_id: format!("snap-{}", s.seq),
            volume_id: volume_id.to_string(),
            volume_size: s.volumes.get(volume_id).map(|v| v.size).unwrap_or(0),
            progress: String::new(),
            start_time: None,
        };
        s.snapshots.push((instance_id.to_string(), snapshot.clone()));
        Ok(snapshot)
    }

    async fn describe_instance_snapshots(&self, instance_id: &str) -> Result<Vec<Snapshot>> {
        self.record(Call::DescribeInstanceSnapshots(instance_id.to_string()));
        Ok(self.snapshots_for(instance_id))
    }

    async fn enable_fast_snapshot_restore(
        &self,
        snapshot_id: &str,
        availability_zone: &str,
    ) -> Result<FsrEnableResult> {
        self.record(Call::EnableFastSnapshotRestore {
            snapshot_id: snapshot_id.to_string(),
            availability_zone: availability_zone.to_string(),
        });
        let s = self.state.lock().unwrap();
        let failing = s
            .snapshots
            .iter()
            .find(|(_, snap)| snap.snapshot_id == snapshot_id)
            .map(|(_, snap)| s.fsr_failing_volumes.contains(&snap.volume_id))
            .unwrap_or(true);
        if failing {
            return Ok(FsrEnableResult {
                successful: false,
                errors: vec![format!(
                    "{} in {}: limit exceeded",
                    snapshot_id, availability_zone
                )],
            });
        }
        Ok(FsrEnableResult {
            successful: true,
            errors: Vec::new(),
        })
    }

    async fn describe_fast_snapshot_restores(
        &self,
        snapshot_id: &str,
    ) -> Result<Vec<FastSnapshotRestore>> {
        self.record(Call::DescribeFastSnapshotRestores(snapshot_id.to_string()));
        let s = self.state.lock().unwrap();
        Ok(s.fsr
            .iter()
            .filter(|r| r.snapshot_id == snapshot_id)
            .cloned()
            .collect())
    }

    async fn create_volume(&self, req: &CreateVolumeRequest) -> Result<String> {
        self.record(Call::CreateVolume(req.clone()));
        let mut s = self.state.lock().unwrap();
        s.seq += 1;
        let volume_id = format!("vol-new-{}", s.seq);
        let size = s
            .snapshots
            .iter()
            .find(|(_, snap)| snap.snapshot_id == req.snapshot_id)
            .map(|(_, snap)| snap.volume_size)
            .unwrap_or(0);
        s.volumes.insert(
            volume_id.clone(),
            Volume {
                volume_id: volume_id.clone(),
                size,
                state: VolumeState::Available,
                availability_zone: req.availability_zone.clone(),
                kms_key_id: req.kms_key_id.clone(),
                fast_restored: true,
            },
        );
        let creating = vec![VolumeState::Creating; s.creating_polls];
        s.scripted
            .entry(volume_id.clone())
            .or_default()
            .extend(creating);
        Ok(volume_id)
    }

    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> Result<()> {
        self.record(Call::DetachVolume {
            instance_id: instance_id.to_string(),
            volume_id: volume_id.to_string(),
        });
        let mut s = self.state.lock().unwrap();
        let inst = match s.instances.iter_mut().find(|i| i.instance_id == instance_id) {
            Some(i) => i,
            None => {
                return Err(Error::API {
                    message: format!("instance '{}' not found", instance_id),
                    retryable: false,
                })
            }
        };
        inst.block_devices.retain(|bd| bd.volume_id != volume_id);
        if let Some(v) = s.volumes.get_mut(volume_id) {
            v.state = VolumeState::Available;
        }
        Ok(())
    }

    async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()> {
        self.record(Call::AttachVolume {
            instance_id: instance_id.to_string(),
            volume_id: volume_id.to_string(),
            device: device.to_string(),
        });
        let mut s = self.state.lock().unwrap();
        let inst = match s.instances.iter_mut().find(|i| i.instance_id == instance_id) {
            Some(i) => i,
            None => {
                return Err(Error::API {
                    message: format!("instance '{}' not found", instance_id),
                    retryable: false,
                })
            }
        };
        if inst.block_devices.iter().any(|bd| bd.device_name == device) {
            return Err(Error::API {
                message: format!("device '{}' already in use", device),
                retryable: false,
            });
        }
        inst.block_devices.push(BlockDevice::new(device, volume_id));
        if let Some(v) = s.volumes.get_mut(volume_id) {
            v.state = VolumeState::InUse;
        }
        Ok(())
    }
}
