use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use watchgod::config::{load_config, WatchgodConfig};
use watchgod::heartbeat::{run_heartbeat, HeartbeatOutcome};
use watchgod::CancellationToken;

/// Run a simulated worker under a watchdog: pet it on an interval, stall,
/// and report whether the watchdog fired.
#[derive(Parser, Debug)]
#[command(name = "watchgod", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "watchgod.toml")]
    config: PathBuf,

    /// Watchdog timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Delay between resets in milliseconds (overrides config)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Number of resets before the worker stalls (overrides config)
    #[arg(long)]
    beats: Option<u32>,

    /// Wait after the last reset before declaring the worker done (overrides config)
    #[arg(long)]
    grace_ms: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (every reset, monitor lifecycle)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors and the final summary
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut WatchgodConfig) {
        if let Some(timeout_ms) = self.timeout_ms {
            config.watchdog.timeout_ms = timeout_ms;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.heartbeat.interval_ms = interval_ms;
        }
        if let Some(beats) = self.beats {
            config.heartbeat.beats = beats;
        }
        if let Some(grace_ms) = self.grace_ms {
            config.heartbeat.grace_ms = grace_ms;
        }
    }

    fn default_filter(&self) -> &'static str {
        if self.verbose {
            "watchgod=trace"
        } else if self.quiet {
            "watchgod=error"
        } else {
            "watchgod=info"
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_filter())),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "config error");
            return ExitCode::from(2);
        }
    };
    cli.apply_overrides(&mut config);

    if cli.dry_run {
        println!("Config file: {}", cli.config.display());
        println!("{:#?}", config);
        println!("Dry run mode, not running.");
        return ExitCode::SUCCESS;
    }

    let root = CancellationToken::new();
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let summary = match run_heartbeat(&root, &config.watchdog, &config.heartbeat).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "watchdog monitor failed");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{:?}: {} beats sent, {} resets observed, watchdog lived {}ms",
        summary.outcome,
        summary.beats_sent,
        summary.report.resets_observed,
        summary.report.lifetime.as_millis()
    );

    match summary.outcome {
        HeartbeatOutcome::Finished => ExitCode::SUCCESS,
        HeartbeatOutcome::Expired => ExitCode::from(1),
        HeartbeatOutcome::Interrupted => ExitCode::from(130),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "watchgod",
            "--timeout-ms",
            "100",
            "--interval-ms",
            "40",
            "--beats",
            "12",
            "--grace-ms",
            "0",
        ]);
        let mut config = WatchgodConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.watchdog.timeout_ms, 100);
        assert_eq!(config.heartbeat.interval_ms, 40);
        assert_eq!(config.heartbeat.beats, 12);
        assert_eq!(config.heartbeat.grace_ms, 0);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let cli = Cli::parse_from(["watchgod"]);
        let mut config = WatchgodConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.watchdog.timeout_ms, 1000);
        assert_eq!(config.heartbeat.beats, 10);
        assert_eq!(cli.config, PathBuf::from("watchgod.toml"));
    }

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(Cli::parse_from(["watchgod"]).default_filter(), "watchgod=info");
        assert_eq!(
            Cli::parse_from(["watchgod", "-v"]).default_filter(),
            "watchgod=trace"
        );
        assert_eq!(
            Cli::parse_from(["watchgod", "-q"]).default_filter(),
            "watchgod=error"
        );
    }
}
