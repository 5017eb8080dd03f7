use std::io::{self, Error, ErrorKind};

use clap::{Arg, ArgAction, ArgMatches};
use ebs_manager::config::Config;

/// Flags shared by every subcommand.
pub fn common() -> Vec<Arg> {
    vec![
        Arg::new("LOG_LEVEL")
            .long("log-level")
            .short('l')
            .help("Sets the log level")
            .required(false)
            .num_args(1)
            .value_parser(["debug", "info", "warn", "error"])
            .default_value("info"),
        Arg::new("CONFIG_FILE_PATH")
            .long("config-file-path")
            .short('c')
            .help("The YAML config file to load")
            .required(false)
            .num_args(1),
        Arg::new("REGION")
            .long("region")
            .short('r')
            .help("Overrides the AWS region in the config")
            .required(false)
            .num_args(1),
        Arg::new("INSTANCE_ID")
            .long("instance-id")
            .short('i')
            .help("Overrides the target instance Ids in the config (repeatable)")
            .required(false)
            .num_args(1)
            .action(ArgAction::Append),
        Arg::new("KMS_KEY_ID")
            .long("kms-key-id")
            .help("Overrides the KMS key for restored volumes")
            .required(false)
            .num_args(1),
    ]
}

/// Initializes the logger from "RUST_LOG", falling back to "--log-level".
pub fn init_logger(m: &ArgMatches) {
    let log_level = m
        .get_one::<String>("LOG_LEVEL")
        .map(String::as_str)
        .unwrap_or("info");

    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );
}

#[derive(Debug, Clone)]
pub struct Options {
    pub log_level: String,
    pub config_file_path: Option<String>,
    pub config: Config,
}

impl Options {
    /// Loads the config file (or the defaults) and applies the flag overrides.
    pub fn parse(m: &ArgMatches) -> io::Result<Self> {
        let log_level = m
            .get_one::<String>("LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| String::from("info"));

        let config_file_path = m.get_one::<String>("CONFIG_FILE_PATH").cloned();
        let mut config = match &config_file_path {
            Some(p) if std::path::Path::new(p).exists() => Config::load(p)?,
            Some(p) => {
                log::warn!("config file '{}' not found, using defaults", p);
                Config::default()
            }
            None => Config::default(),
        };

        if let Some(region) = m.get_one::<String>("REGION") {
            config.region = region.clone();
        }
        if let Some(ids) = m.get_many::<String>("INSTANCE_ID") {
            config.instance_ids = ids.cloned().collect();
        }
        if let Some(key) = m.get_one::<String>("KMS_KEY_ID") {
            config.kms_key_id = Some(key.clone());
        }
        config.validate()?;

        Ok(Self {
            log_level,
            config_file_path,
            config,
        })
    }

    pub fn require_instances(&self) -> io::Result<&[String]> {
        if self.config.instance_ids.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "no instance Id given (set 'instance_ids' or '--instance-id')",
            ));
        }
        Ok(&self.config.instance_ids)
    }
}
