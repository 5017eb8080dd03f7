use std::io::{self, stdout, Error, ErrorKind};

use clap::Command;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};

use crate::flags;

pub const NAME: &str = "default-config";

pub fn command() -> Command {
    Command::new(NAME)
        .about("Writes a default configuration file")
        .args(flags::common())
}

pub fn execute(opts: &flags::Options) -> io::Result<()> {
    let path = match &opts.config_file_path {
        Some(p) => p,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "'--config-file-path' is required",
            ))
        }
    };

    opts.config.sync(path)?;
    let contents = opts.config.encode_yaml()?;

    execute!(
        stdout(),
        SetForegroundColor(Color::Blue),
        Print(format!("\nSaved config: '{}'\n", path)),
        ResetColor
    )?;
    println!("{}", contents);
    Ok(())
}
