//! REPL – the operator panel.
//!
//! Stands in for the lobby call buttons, the cabin keypad and the fire,
//! overload and obstruction switches. Every command becomes one event on
//! the bus, exactly as a hardware panel would publish it.
//!
//! Supported slash-commands:
//!   /up N, /down N    – hall call at floor N
//!   /car N            – cabin button N
//!   /fire on|off      – fire recall switch
//!   /overload on|off  – load sensor
//!   /obstruct on|off  – door edge sensor
//!   /clear            – drop every pending request
//!   /status           – show the car
//!   /help             – show this list
//!   /quit | /exit     – leave the panel

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;

use liftsim_middleware::handler;
use liftsim_runtime::ElevatorSystem;
use liftsim_types::{Channel, DoorState, Event, Payload};

/// One parsed line of operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Press(Channel, Payload),
    Status,
    Help,
    Quit,
}

/// Parse one line. Errors carry the message shown to the operator.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let arg = words.next();
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }

    let cmd = match head {
        "/up" => Command::Press(Channel::HallCallUp, floor_arg(head, arg)?),
        "/down" => Command::Press(Channel::HallCallDown, floor_arg(head, arg)?),
        "/car" => Command::Press(Channel::CabinSelect, floor_arg(head, arg)?),
        "/fire" => Command::Press(Channel::FireToggled, switch_arg(head, arg)?),
        "/overload" => Command::Press(Channel::OverloadToggled, switch_arg(head, arg)?),
        "/obstruct" => Command::Press(Channel::ObstructToggled, switch_arg(head, arg)?),
        "/clear" => Command::Press(Channel::ClearAllRequests, Payload::Empty),
        "/status" => Command::Status,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    if arg.is_some() && matches!(cmd, Command::Status | Command::Help | Command::Quit) {
        return Err(format!("{head} takes no argument"));
    }
    if arg.is_some() && head == "/clear" {
        return Err(format!("{head} takes no argument"));
    }
    Ok(cmd)
}

fn floor_arg(head: &str, arg: Option<&str>) -> Result<Payload, String> {
    let raw = arg.ok_or_else(|| format!("usage: {head} <floor>"))?;
    raw.parse::<i32>()
        .map(Payload::Floor)
        .map_err(|_| format!("'{raw}' is not a floor number"))
}

fn switch_arg(head: &str, arg: Option<&str>) -> Result<Payload, String> {
    match arg {
        Some("on") => Ok(Payload::Flag(true)),
        Some("off") => Ok(Payload::Flag(false)),
        _ => Err(format!("usage: {head} on|off")),
    }
}

/// Entry point for the interactive REPL. Returns when the operator quits,
/// closes stdin or presses Ctrl-C.
pub fn run(system: Arc<ElevatorSystem>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    system.bus().subscribe(
        Channel::RequestDenied,
        handler(|event: &Event| {
            if let Some(d) = event.payload.denial() {
                println!(
                    "\n  {} floor {} ({})",
                    "✗ Request denied:".red().bold(),
                    d.floor,
                    d.reason
                );
            }
        }),
    );

    loop {
        let line = match rl.readline(&format!("{} ", "liftsim>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                crate::emergency_stop(&system);
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match parse(line) {
            Ok(Command::Press(channel, payload)) => {
                if let Err(e) = system.publish(channel, payload) {
                    println!("{}: {}", "Bus error".red(), e);
                }
            }
            Ok(Command::Status) => cmd_status(&system),
            Ok(Command::Help) => cmd_help(),
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Err(msg) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                msg.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "LiftSim Commands".bold().underline());
    println!("  {}  – hall call at floor N", "/up N  /down N".bold().cyan());
    println!("  {}           – cabin button N", "/car N".bold().cyan());
    println!("  {}    – fire recall switch", "/fire on|off".bold().cyan());
    println!("  {} – load sensor", "/overload on|off".bold().cyan());
    println!("  {} – door edge sensor", "/obstruct on|off".bold().cyan());
    println!("  {}           – drop every pending request", "/clear".bold().cyan());
    println!("  {}          – show the car", "/status".bold().cyan());
    println!("  {}    – exit the panel", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(system: &ElevatorSystem) {
    let Some(ctrl) = system.controller() else {
        println!(
            "  No controller in this process (role {}).",
            system.config().role.to_string().yellow()
        );
        return;
    };
    let s = ctrl.snapshot();

    let door = match s.door {
        DoorState::Open => s.door.to_string().green(),
        DoorState::Closed => s.door.to_string().normal(),
        DoorState::Obstructed => s.door.to_string().red().bold(),
        DoorState::Opening | DoorState::Closing => s.door.to_string().yellow(),
    };
    let list = |floors: &[i32]| {
        if floors.is_empty() {
            "-".dimmed().to_string()
        } else {
            floors.iter().map(i32::to_string).collect::<Vec<_>>().join(" ")
        }
    };

    println!("{}", "Car Status".bold().underline());
    println!("  Floor     : {}", s.current_floor.to_string().bold());
    println!("  Target    : {}", s.target_floor);
    println!("  Direction : {}", s.direction);
    println!("  Door      : {}", door);
    println!(
        "  Mode      : {}",
        if s.fire_mode { "FIRE".red().bold() } else { "NORMAL".green() }
    );
    println!("  Hall up   : {}", list(&s.hall_up));
    println!("  Hall down : {}", list(&s.hall_down));
    println!("  Cabin     : {}", list(&s.cabin));
}
