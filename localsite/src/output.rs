use std::fmt::Display;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use console::{colors_enabled, style};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn brand_accent<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).cyan()
}

pub fn brand_fg<D: Display>(value: D) -> console::StyledObject<D> {
    style(value)
}

pub fn brand_muted<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).dim()
}

pub fn brand_success<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).green()
}

pub fn brand_warning<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).yellow()
}

pub fn brand_error<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).red()
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn section(title: &str) {
    println!();
    println!("{}", brand_accent(title).bold());
}

pub fn step(message: &str) {
    println!("{} {}", brand_accent("•").bold(), brand_fg(message));
}

pub fn success(message: &str) {
    println!("{} {}", brand_success("✓").bold(), brand_fg(message));
}

pub fn warning(message: &str) {
    println!("{} {}", brand_warning("!").bold(), brand_fg(message));
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", brand_error("✗").bold(), brand_fg(message));
}

pub fn muted(message: &str) {
    println!("{}", brand_muted(message));
}

pub fn emphasized(value: &str) -> String {
    if std::io::stdout().is_terminal() && colors_enabled() {
        // Italic on/off (3/23) rather than a full reset keeps surrounding styles.
        format!("\x1b[3m{}\x1b[23m", value)
    } else {
        format!("'{}'", value)
    }
}

/// `  label  value` with the label padded to `width`.
pub fn field(label: &str, value: &str, width: usize) {
    println!("  {}  {}", brand_muted(format!("{label:<width$}")), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_round_trips() {
        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
        assert!(!is_verbose());
    }
}
