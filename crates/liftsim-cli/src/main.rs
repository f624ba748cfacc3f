//! `liftsim-cli` – LiftSim Command Line Interface
//!
//! The `liftsim` binary starts one LiftSim process. It:
//!
//! 1. Loads `~/.liftsim/config.toml`, writing the defaults on first run.
//! 2. Builds the elevator system for the configured role and joins the
//!    local or networked bus (first process on the port becomes the hub).
//! 3. Drops the operator into a **REPL** that acts as the hall and cabin
//!    panels (`/up`, `/down`, `/car`, `/fire`, `/status`, …).
//! 4. Intercepts **Ctrl-C** to publish a motor stop and exit.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use liftsim_middleware::TokioClock;
use liftsim_runtime::{ElevatorSystem, init_tracing};
use liftsim_types::{Channel, Payload};

fn main() {
    let telemetry = init_tracing("liftsim");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::fallback()
        }
    };

    let system_config = match cfg.system_config() {
        Ok(c) => c,
        Err(e) => {
            println!("{}: {}", "Invalid configuration".red(), e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };
    let clock = match TokioClock::start("liftsim-timer") {
        Ok(clock) => Arc::new(clock),
        Err(e) => {
            error!(error = %e, "failed to start timer thread");
            std::process::exit(1);
        }
    };

    let system = match runtime.block_on(ElevatorSystem::connect(system_config, clock)) {
        Ok(system) => Arc::new(system),
        Err(e) => {
            println!("{}: {}", "Could not join the bus".red(), e);
            std::process::exit(1);
        }
    };

    print_summary(&cfg, &system);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let for_ctrlc = Arc::clone(&system);
    if let Err(e) = ctrlc::set_handler(move || {
        emergency_stop(&for_ctrlc);
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the car");
    }

    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    repl::run(Arc::clone(&system));

    drop(system);
    drop(runtime);
    drop(telemetry);
}

/// Publish a motor stop and report it. Used by Ctrl-C in and out of the REPL.
pub(crate) fn emergency_stop(system: &ElevatorSystem) {
    println!();
    println!("{}", "⚠  Ctrl-C received – stopping the car …".yellow().bold());
    match system.publish(Channel::CtrlStop, Payload::Empty) {
        Ok(()) => println!("{}", "  ✓ Stop published to the bus.".green()),
        Err(e) => println!("{}: {}", "  ✗ Stop not published".red(), e),
    }
    // Give the networked writer a moment to flush the frame.
    std::thread::sleep(Duration::from_millis(100));
    println!("{}", "  ✓ Exiting LiftSim.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!("  No configuration found. Writing defaults.");
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::fallback()
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __   _  __ _    ____  _         "#.bold().cyan());
    println!("{}", r#"  / /  (_)/ _| |_ / ___|(_)_ __ ___ "#.bold().cyan());
    println!("{}", r#" / /   | | |_| __|\___ \| | '_ ` _ \"#.bold().cyan());
    println!("{}", r#"/ /___ | |  _| |_  ___) | | | | | | |"#.bold().cyan());
    println!("{}", r#"\____/ |_|_|  \__||____/|_|_| |_| |_|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "LiftSim".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Elevator controller and motion simulator");
    println!();
}

fn print_summary(cfg: &config::Config, system: &ElevatorSystem) {
    let sc = system.config();
    let transport = match system.bus_role() {
        Some(role) => format!("{} ({:?} on {}:{})", cfg.transport, role, cfg.host, cfg.port),
        None => cfg.transport.to_string(),
    };
    println!("  Transport : {}", transport.bold());
    println!("  Role      : {}", sc.role.to_string().bold());
    println!(
        "  Floors    : {}..={} (recall {})",
        sc.policy.lowest_floor, sc.policy.highest_floor, sc.policy.recall_floor
    );
    println!();
}
