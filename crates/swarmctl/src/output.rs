//! Terminal output formatting for swarmctl.
//!
//! Colors and symbols follow the teacher's convention; the higher-level
//! printers below render workflow/execution/agent state instead of the
//! teacher's fleet/RCA report shapes, which have no counterpart here.

use std::io::{self, Write};

/// ANSI color codes for terminal styling
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const WHITE: &str = "\x1b[37m";
    pub const GRAY: &str = "\x1b[90m";

    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
}

/// Unicode symbols for terminal output
pub mod symbols {
    pub const CHECK: &str = "\u{2713}";
    pub const CROSS: &str = "\u{2717}";
    pub const BULLET: &str = "\u{2022}";
    pub const CIRCLE: &str = "\u{25cf}";
    pub const WARNING: &str = "\u{26a0}";
    pub const INFO: &str = "\u{2139}";
    pub const SPINNER: [&str; 4] = ["\u{25d0}", "\u{25d3}", "\u{25d1}", "\u{25d2}"];
}

use colors::*;
use symbols::*;

/// Formats command output for a terminal, auto-detecting color support and
/// honoring `--quiet`.
pub struct ConsoleOutput {
    use_colors: bool,
    quiet: bool,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stdout),
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn c<'a>(&self, code: &'a str) -> &'a str {
        if self.use_colors {
            code
        } else {
            ""
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}{}{} {}Error:{} {}", self.c(RED), self.c(BOLD), CROSS, self.c(RESET), self.c(RESET), message);
    }

    pub fn print_warning(&self, message: &str) {
        eprintln!("{}{} Warning:{} {}", self.c(YELLOW), WARNING, self.c(RESET), message);
    }

    pub fn print_info(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!("{}{}{} {}", self.c(BLUE), INFO, self.c(RESET), message);
    }

    pub fn print_success(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!("{}{}{} {}", self.c(GREEN), CHECK, self.c(RESET), message);
    }

    /// Colorize an execution/agent/workflow status word for text output.
    pub fn status_badge(&self, status: &str) -> String {
        let color = match status {
            "Completed" | "Healthy" | "Active" => GREEN,
            "Running" | "Warning" | "Pending" => YELLOW,
            "Failed" | "Critical" | "Cancelled" | "Offline" | "TimedOut" => RED,
            _ => GRAY,
        };
        format!("{}{}{}", self.c(color), status, self.c(RESET))
    }

    pub fn print_section(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!("{}{}{}{}{}", self.c(CYAN), self.c(BOLD), title, self.c(RESET), "");
    }

    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Minimal progress spinner for long-running `serve`/`execute --wait` polls.
pub struct Spinner {
    state: usize,
    message: String,
}

impl Spinner {
    pub fn new(message: impl Into<String>) -> Self {
        Self { state: 0, message: message.into() }
    }

    pub fn tick(&mut self) {
        self.state = (self.state + 1) % SPINNER.len();
        print!("\r{}{}{} {}", CYAN, SPINNER[self.state], RESET, self.message);
        let _ = io::stdout().flush();
    }

    pub fn finish(&self, success: bool) {
        let (symbol, color) = if success { (CHECK, GREEN) } else { (CROSS, RED) };
        println!("\r{}{}{} {}", color, symbol, RESET, self.message);
    }
}
