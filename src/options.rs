use clap::Parser;

/// evmeter-bridge - polls an EV charger over its MQTT command channel
#[derive(Debug, Default, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Run a single poll cycle and exit
    #[clap(long = "once")]
    pub once: bool,

    /// Check the broker and charger answer, then exit
    #[clap(long = "validate", conflicts_with = "once")]
    pub validate: bool,

    /// Talk to an in-process simulated charger instead of the broker
    #[clap(long = "simulate")]
    pub simulate: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
