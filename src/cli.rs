use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bchannel")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Browser channel negotiation and connectivity probing")]
pub struct Cli {
    /// Write the default config file
    #[arg(long = "init")]
    pub init: bool,

    /// Print the effective config
    #[arg(long = "print")]
    pub print: bool,

    /// Validate the config file
    #[arg(long = "check")]
    pub check: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full connection-capability negotiation
    Test {
        /// Channel server base URL
        base_url: String,

        /// Channel path relative to the base URL
        #[arg(long, default_value = "/channel/test")]
        path: String,

        /// Treat the transport as non-streaming (TYPE=html)
        #[arg(long)]
        no_streaming: bool,

        /// Route the back channel through the host prefix
        #[arg(long)]
        secondary_domains: bool,
    },
    /// Run a single image-load reachability probe
    Probe {
        /// Image URL
        url: String,

        /// Per-attempt timeout; defaults to the configured blocked-probe timeout
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Retries after the first failure; defaults to the configured count
        #[arg(long)]
        retries: Option<u32>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
