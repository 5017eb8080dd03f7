use std::io::{self, stdout};

use clap::Command;
use ebs_manager::{ec2, snapshot};

use crate::flags;

pub const NAME: &str = "snapshot";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Snapshots every volume of the instances and enables FSR")
        .args(flags::common())
}

pub async fn execute(opts: &flags::Options) -> io::Result<()> {
    let instance_ids = opts.require_instances()?;

    let region = opts.config.region.clone();
    let shared_config = ebs_manager::load_config(Some(region)).await;
    let ec2_manager = ec2::Manager::new(&shared_config);

    let outcomes = snapshot::create_snapshots(&ec2_manager, instance_ids, &mut stdout())
        .await?;
    for o in outcomes.iter() {
        log::info!(
            "'{}': created {} snapshots, FSR enabled for {}",
            o.instance_id,
            o.snapshots.len(),
            o.fsr_enabled.len()
        );
    }
    Ok(())
}
