use bchannel::cli::{Cli, Commands};
use bchannel::config::Config;
use clap::CommandFactory;

#[cfg(feature = "network")]
use bchannel::core::channel::{
    ChannelEndpoint, ConnectionProbe, IsahcChannelRequester, IsahcImageLoader, RequestErrorKind,
    StatsRecorder, TestChannel, TestChannelOwner, TestOutcome,
};
#[cfg(feature = "network")]
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();

    // Handle configuration commands
    if cli.init {
        let (path, written) = Config::init()?;
        if written {
            println!("Created {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
        return Ok(());
    }

    if cli.print {
        let config = Config::load().unwrap_or_default();
        config.print()?;
        return Ok(());
    }

    if cli.check {
        let config = Config::load()?;
        config.check()?;
        println!("✓ Configuration valid");
        return Ok(());
    }

    let config = Config::load()?;
    config.check()?;

    match cli.command {
        Some(command) => run_command(command, config).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

#[cfg(not(feature = "network"))]
async fn run_command(_command: Commands, _config: Config) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Network feature is not enabled. Please install with --features network");
    std::process::exit(1);
}

#[cfg(feature = "network")]
async fn run_command(command: Commands, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Test {
            base_url,
            path,
            no_streaming,
            secondary_domains,
        } => {
            let mut options = config.test_channel_options();
            if no_streaming {
                options.capabilities.supports_streaming = false;
            }

            let stats = Arc::new(StatsRecorder::new());
            let owner = Arc::new(CliOwner { secondary_domains });
            let mut channel = TestChannel::new(
                owner,
                ChannelEndpoint::new(&base_url)?,
                Arc::new(IsahcChannelRequester::new()?),
                Arc::new(IsahcImageLoader::new()?),
            )
            .with_options(options)
            .with_notifier(stats.clone());

            let outcome = channel.connect(&path).await?;
            println!("outcome: {}", describe(&outcome));
            if let Some(prefix) = channel.host_prefix() {
                println!("host prefix: {}", prefix);
            }
            if let Some(prefix) = channel.blocked_prefix() {
                println!("blocked prefix: {}", prefix);
            }
            println!("last status: {}", channel.last_status_code());
            for (stat, count) in stats.stat_summary() {
                println!("  {:?}: {}", stat, count);
            }
            Ok(())
        }
        Commands::Probe {
            url,
            timeout_ms,
            retries,
        } => {
            let mut options = config.probe_options();
            if let Some(timeout_ms) = timeout_ms {
                options.timeout_ms = timeout_ms;
            }
            if let Some(retries) = retries {
                options.retries = retries;
            }

            let url = url::Url::parse(&url)?;
            let mut probe = ConnectionProbe::new(Arc::new(IsahcImageLoader::new()?));
            if probe.probe_with_options(&url, &options).await {
                println!("✓ reachable");
                Ok(())
            } else {
                println!("✗ unreachable after {} attempt(s)", options.retries + 1);
                std::process::exit(2);
            }
        }
    }
}

#[cfg(feature = "network")]
fn describe(outcome: &TestOutcome) -> String {
    match outcome {
        TestOutcome::Finished { unbuffered: true } => "unbuffered (streaming works)".to_string(),
        TestOutcome::Finished { unbuffered: false } => "buffered (a proxy delays chunks)".to_string(),
        TestOutcome::Failed(kind) => format!("failed ({})", kind),
        TestOutcome::Blocked => "blocked by the network".to_string(),
        TestOutcome::Aborted => "aborted".to_string(),
    }
}

/// Owner that only reports; the outcome is printed from `connect`'s return value
#[cfg(feature = "network")]
struct CliOwner {
    secondary_domains: bool,
}

#[cfg(feature = "network")]
impl TestChannelOwner for CliOwner {
    fn should_use_secondary_domains(&self) -> bool {
        self.secondary_domains
    }

    fn test_connection_finished(&self, _channel: &TestChannel, unbuffered: bool) {
        eprintln!("[bchannel] negotiation finished, unbuffered={}", unbuffered);
    }

    fn test_connection_failure(&self, _channel: &TestChannel, kind: RequestErrorKind) {
        eprintln!("[bchannel] negotiation failed: {}", kind);
    }

    fn test_connection_blocked(&self, _channel: &TestChannel) {
        eprintln!("[bchannel] channel blocked");
    }
}
