//! Terminal output for installs
//!
//! owo-colors for color, indicatif for the per-command spinner. Everything
//! here is for the person at the terminal; diagnostics go through `tracing`.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::executor::Planned;
use crate::executor::runner::display_command;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// "==> Installing magnum-bindings"
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Install phase marker: "  -> fetch"
pub fn phase(name: &str) {
    println!("  {} {}", "->".cyan(), name);
}

/// Numbered install step: "  [3/5] cmake --build ."
pub fn step(index: usize, total: usize, command: &str) {
    let counter = format!("[{}/{}]", index, total);
    println!("  {} {}", counter.cyan(), command);
}

/// Indented secondary line, dimmed.
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Status of a row in `formula list` or `formula deps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Missing,
    Invalid,
}

pub fn row(name: &str, mark: Mark, note: &str) {
    match mark {
        Mark::Ok => println!("  {} {} {}", "✓".green(), name.green(), note.dimmed()),
        Mark::Missing => println!("  {} {} {}", "✗".red(), name, note.dimmed()),
        Mark::Invalid => println!("  {} {} {}", "!".yellow(), name, note.yellow()),
    }
}

/// Print a materialized plan, indenting commands by directory scope.
pub fn plan(plan: &[Planned]) {
    let mut depth = 1;
    for op in plan {
        let indent = "  ".repeat(depth);
        match op {
            Planned::Enter(dir) => {
                println!("{}{} {}", indent, "cd".cyan(), dir);
                depth += 1;
            }
            Planned::Leave => depth = depth.saturating_sub(1).max(1),
            Planned::Command { index, argv, expect } => {
                let number = format!("{}.", index);
                print!("{}{} {}", indent, number.dimmed(), display_command(argv));
                if *expect != 0 {
                    print!(" {}", format!("(expect {})", expect).dimmed());
                }
                println!();
            }
        }
    }
}

/// Spinner shown while an external command runs.
pub fn command_spinner(argv: &[String]) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("     {spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICKS);
    pb.set_style(style);
    pb.set_message(display_command(argv));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Leave the spinner line in place, replaced by `reason` in red.
pub fn spinner_failed(pb: ProgressBar, reason: &str) {
    pb.finish_with_message(reason.red().to_string());
}

pub fn spinner_done(pb: ProgressBar) {
    pb.finish_and_clear();
}
