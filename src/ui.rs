//! Colored console output helpers for the CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};

fn prefix() -> String {
    "[fleetctl]".bold().cyan().to_string()
}

/// Print an informational message: [fleetctl] message
pub fn info(msg: &str) {
    println!("{} {}", prefix(), msg);
}

/// Print a success message: [fleetctl] message (in green)
pub fn success(msg: &str) {
    println!("{} {}", prefix(), msg.green());
}

/// Print an error message: [fleetctl] ERROR: message (in red)
pub fn error(msg: &str) {
    eprintln!("{} {}", "[fleetctl]".bold().red(), msg.red());
}

/// Print a warning message: [fleetctl] message (in yellow)
pub fn warn(msg: &str) {
    println!("{} {}", prefix(), msg.yellow());
}

/// Print a numbered step: [fleetctl] Step n/total: message
pub fn step(n: u32, total: u32, msg: &str) {
    println!("\n{} {} {}", prefix(), format!("Step {}/{}:", n, total).bold().yellow(), msg);
}

/// Interactive yes/no confirmation on stdin. Returns `false` on EOF or any
/// read error rather than blocking forever.
pub fn confirm(msg: &str) -> bool {
    print!("{} {} [y/N] ", prefix(), msg);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Create and start a spinner with the given message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.cyan} {msg}")
            .expect("invalid spinner template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
