pub mod config;
pub mod console;
pub mod ec2;
pub mod errors;
pub mod poll;
pub mod prompt;
pub mod replace;
pub mod snapshot;
pub mod status;

use aws_config::{self, meta::region::RegionProviderChain};
use aws_types::{region::Region, SdkConfig as AwsSdkConfig};

/// Loads an AWS config from default environments.
/// Falls back to the environment's region, then "us-west-2".
pub async fn load_config(reg: Option<String>) -> AwsSdkConfig {
    log::info!("loading AWS configuration for region {:?}", reg);
    let regp = RegionProviderChain::first_try(reg.map(Region::new))
        .or_default_provider()
        .or_else(Region::new(config::DEFAULT_REGION));

    aws_config::from_env().region(regp).load().await
}
