mod default_config;
mod flags;
mod replace;
mod snapshot;
mod status;

use std::io;

use clap::{crate_version, Command};

pub const APP_NAME: &str = "ebs-manager";

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("EBS snapshot, fast snapshot restore, and volume replacement")
        .subcommands(vec![
            default_config::command(),
            snapshot::command(),
            status::command(),
            replace::command(),
        ])
        .get_matches();

    if let Some((_, sub_matches)) = matches.subcommand() {
        flags::init_logger(sub_matches);
    }

    match matches.subcommand() {
        Some((default_config::NAME, sub_matches)) => {
            let opts = flags::Options::parse(sub_matches)?;
            default_config::execute(&opts)
        }

        Some((snapshot::NAME, sub_matches)) => {
            let opts = flags::Options::parse(sub_matches)?;
            snapshot::execute(&opts).await
        }

        Some((status::NAME, sub_matches)) => {
            let opts = flags::Options::parse(sub_matches)?;
            status::execute(&opts).await
        }

        Some((replace::NAME, sub_matches)) => {
            let opts = flags::Options::parse(sub_matches)?;
            let skip_prompt = sub_matches.get_flag("SKIP_PROMPT");
            replace::execute(&opts, skip_prompt).await
        }

        _ => unreachable!("unknown subcommand"),
    }
}
