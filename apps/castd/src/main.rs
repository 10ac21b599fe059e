// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The CastKit daemon: builds the configured pipeline and serves the control
//! channel until a `stop` event arrives.
//!
//! Exit codes: `0` clean shutdown, `1` control-socket creation failure,
//! `2` pipeline initialization failure.

use clap::Parser;
use tracing::{error, info};

mod bootstrap;
mod cli;
mod config;
mod logging;

use castkit_engine::controller::Controller;
use castkit_engine::pipeline::shared_manager;
use cli::{Cli, Commands, ConfigCommands};

const EXIT_SOCKET_FAILURE: i32 = 1;
const EXIT_INIT_FAILURE: i32 = 2;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config(ConfigCommands::Default)) => {
            print_default_config();
        },
        Some(Commands::Serve) | None => {
            let code = serve(&cli.config);
            std::process::exit(code);
        },
    }
}

fn print_default_config() {
    match toml::to_string_pretty(&config::Config::default()) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            eprintln!("failed to render default config: {e}");
            std::process::exit(EXIT_INIT_FAILURE);
        },
    }
}

fn serve(config_path: &str) -> i32 {
    let config = match config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {config_path}: {e}");
            return EXIT_INIT_FAILURE;
        },
    };

    let _log_guard = match logging::init_logging(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return EXIT_INIT_FAILURE;
        },
    };

    info!(config = config_path, port = config.control.port, "castd starting");

    let manager = match bootstrap::build_pipeline(&config.pipeline) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "pipeline initialization failed");
            return EXIT_INIT_FAILURE;
        },
    };
    let manager = shared_manager(manager);

    let controller = match Controller::bind(manager.clone(), config.control.port) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "control socket creation failed");
            return EXIT_SOCKET_FAILURE;
        },
    };

    if let Err(e) = controller.run() {
        error!(error = %e, "control channel failed");
    }

    if let Ok(mut manager) = manager.lock() {
        manager.shutdown();
    }
    info!("castd stopped");
    0
}
