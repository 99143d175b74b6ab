use std::process::ExitCode;

use clap::Parser;

use inkfe::cli::{self, CliArgs};
use inkfe::logger;
use inkfe::settings::RenderSettings;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    let settings = RenderSettings::load();
    inkfe::log_info!("settings: {:?}", settings);

    cli::run(args, &settings)
}
