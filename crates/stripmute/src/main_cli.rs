//! StripMute CLI — inspect configuration and replay host event streams
//! against a simulated Voicemeeter mixer.

use std::path::PathBuf;

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "stripmute-cli",
    version,
    about = "Voicemeeter strip mute control for Stream Deck keys"
)]
struct Args {
    /// Output as JSON (for config)
    #[arg(long, global = true)]
    json: bool,

    /// Log plugin activity (info level; RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
