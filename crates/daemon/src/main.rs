// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex AutoRunner daemon (card)
//!
//! Background process that owns the flow runtime, agent supervisor, and
//! delivery router for one hub. It listens on a Unix socket for commands
//! from the `car` CLI and other surfaces.

use car_daemon::lifecycle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before touching the hub root.
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("card {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("card {}", env!("CARGO_PKG_VERSION"));
                println!("Codex AutoRunner daemon - owns flow runs and agent sessions for one hub");
                println!();
                println!("USAGE:");
                println!("    card");
                println!();
                println!("The daemon is typically started by the `car` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket under");
                println!("<hub>/.codex-autorunner/daemon/ for commands from `car`.");
                println!();
                println!("ENVIRONMENT:");
                println!("    CAR_HUB_ROOT    Hub root directory (default: cwd)");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: card [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let hub_root = car_daemon::env::hub_root();
    let _log_guard = lifecycle::init_tracing(&hub_root)?;
    tracing::info!(hub = %hub_root.display(), "starting hub daemon");

    if let Err(e) = lifecycle::run_daemon(&hub_root).await {
        match &e {
            lifecycle::LifecycleError::AlreadyRunning(socket) => {
                eprintln!("card is already running");
                eprintln!("  socket: {socket}");
                std::process::exit(1);
            }
            _ => return Err(e.into()),
        }
    }
    Ok(())
}
