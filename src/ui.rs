//! Terminal styling for the run report, plan hints and fatal errors

use colored::{ColoredString, Colorize};
use std::fmt::Display;

/// How a line should read at a glance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Caution,
    Bad,
}

impl Tone {
    fn mark(self) -> ColoredString {
        match self {
            Tone::Good => "✓".green(),
            Tone::Caution => "!".yellow(),
            Tone::Bad => "✗".red(),
        }
    }
}

/// One marked line; `Bad` goes to stderr
pub fn verdict(tone: Tone, msg: &str) {
    match tone {
        Tone::Bad => eprintln!("{} {msg}", tone.mark()),
        _ => println!("{} {msg}", tone.mark()),
    }
}

/// Bold title with a rule under it
pub fn title(text: &str) {
    println!();
    println!("{}", text.bold());
    println!("{}", "─".repeat(text.chars().count()).dimmed());
}

pub fn subtitle(text: &str) {
    println!();
    println!("{}", text.cyan().bold());
}

/// Indented `label: value`
pub fn tally(label: &str, value: impl Display) {
    println!("  {}: {value}", label.dimmed());
}

pub fn hint(text: &str) {
    println!("  {}", text.dimmed());
}
