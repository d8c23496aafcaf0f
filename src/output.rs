use terminal_size::{terminal_size, Width};

// ANSI color codes
pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";
pub const GRAY: &str = "\x1b[90m";

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const MIN_BANNER_WIDTH: usize = 20;
const MAX_BANNER_WIDTH: usize = 80;

/// Print a pipeline step header, e.g. `Step 3: Detecting changes`.
///
/// The label is free-form so non-numbered phases (Rollback, Cleanup) use the
/// same channel.
pub fn print_step(label: &str, message: &str) {
    println!("\n{YELLOW}Step {label}: {message}{RESET}");
}

pub fn print_success(message: &str) {
    println!("{GREEN}{message}{RESET}");
}

pub fn print_error(message: &str) {
    eprintln!("{RED}{message}{RESET}");
}

pub fn print_info(message: &str) {
    println!("{BLUE}{message}{RESET}");
}

pub fn print_warning(message: &str) {
    println!("{YELLOW}{message}{RESET}");
}

fn banner_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
        .clamp(MIN_BANNER_WIDTH, MAX_BANNER_WIDTH)
}

/// Print a phase banner: `━━━ PHASE ━━━`, width adapted to the terminal.
pub fn print_banner(phase: &str) {
    let width = banner_width();
    let label = format!(" {} ", phase);
    let label_len = label.chars().count();
    let remaining = width.saturating_sub(label_len);
    let left = remaining / 2;
    let right = remaining - left;
    println!(
        "{CYAN}{BOLD}{}{}{}{RESET}",
        "━".repeat(left),
        label,
        "━".repeat(right)
    );
}

pub fn print_header() {
    println!("{CYAN}{BOLD}shipmate v{}{RESET}", env!("CARGO_PKG_VERSION"));
    println!();
}
