use std::io::{self, stdout};

use clap::{Arg, ArgAction, Command};
use ebs_manager::{
    ec2,
    prompt::{AutoConfirm, Confirm, Console},
    replace,
};

use crate::flags;

pub const NAME: &str = "replace";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Replaces the volumes of a stopped instance with restored snapshots")
        .args(flags::common())
        .arg(
            Arg::new("SKIP_PROMPT")
                .long("skip-prompt")
                .short('s')
                .help("Answers yes to every confirmation")
                .required(false)
                .action(ArgAction::SetTrue),
        )
}

/// Replaces the volumes of the first configured instance.
pub async fn execute(opts: &flags::Options, skip_prompt: bool) -> io::Result<()> {
    let instance_ids = opts.require_instances()?;
    let instance_id = &instance_ids[0];
    if instance_ids.len() > 1 {
        log::warn!(
            "replacing volumes of '{}' only, ignoring {} other instances",
            instance_id,
            instance_ids.len() - 1
        );
    }

    let region = opts.config.region.clone();
    let shared_config = ebs_manager::load_config(Some(region)).await;
    let ec2_manager = ec2::Manager::new(&shared_config);

    let replace_opts = replace::Options {
        kms_key_id: opts.config.kms_key_id.clone(),
        volume_type: opts.config.volume_type.clone(),
        selection: opts.config.snapshot_selection,
        poller: opts.config.poller(),
    };

    let mut confirm: Box<dyn Confirm> = if skip_prompt {
        Box::new(AutoConfirm)
    } else {
        Box::new(Console)
    };

    let outcome = replace::replace_volumes(
        &ec2_manager,
        instance_id,
        &replace_opts,
        confirm.as_mut(),
        &mut stdout(),
    )
    .await?;
    log::info!(
        "replaced {} volumes of '{}' ({} without snapshot)",
        outcome.replaced.len(),
        instance_id,
        outcome.unmatched.len()
    );
    Ok(())
}
