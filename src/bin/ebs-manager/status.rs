use std::io::{self, stdout};

use clap::Command;
use ebs_manager::{ec2, status};

use crate::flags;

pub const NAME: &str = "status";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Reports snapshot progress and FSR state of the instances")
        .args(flags::common())
}

pub async fn execute(opts: &flags::Options) -> io::Result<()> {
    let instance_ids = opts.require_instances()?;

    let region = opts.config.region.clone();
    let shared_config = ebs_manager::load_config(Some(region)).await;
    let ec2_manager = ec2::Manager::new(&shared_config);

    status::report(&ec2_manager, instance_ids, &mut stdout())
        .await?;
    Ok(())
}
