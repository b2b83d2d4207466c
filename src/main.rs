use anyhow::Context;
use clap::Parser;
use rtmirror::debugger::SessionConfig;
use rtmirror::replay::{self, Script};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replay a debug session script against an in-memory engine and print every notification.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Replay script (TOML)
    script: PathBuf,

    /// Session config file, `~/.config/rtm/session.toml` by default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter in `env_logger` format, overrides config and RUST_LOG
    #[arg(long, env = "RTM_LOG")]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = args.config.as_deref();

    let filter = log_filter(args.log_level.clone(), config_path);
    let mut logger = env_logger::Builder::from_default_env();
    if let Some(filter) = filter.as_deref() {
        logger.parse_filters(filter);
    }
    logger.init();

    // config problems are reported by this second read, once the logger is set
    let config = SessionConfig::from_file(config_path)?;

    let script = Script::from_file(&args.script)?;
    let mut out = io::stdout().lock();
    replay::run(script, config, &mut out).context("replay failed")?;
    out.flush()?;
    Ok(())
}

/// Log filter from command line or config file, read before the logger exists.
fn log_filter(cli: Option<String>, config_path: Option<&Path>) -> Option<String> {
    cli.or_else(|| SessionConfig::from_file(config_path).ok()?.log_level)
}
