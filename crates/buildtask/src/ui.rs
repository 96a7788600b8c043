//! Console output helpers for the runner binary.

use colored::Colorize;

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(40).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(40).bright_black());
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "✗".red().bold(), message.red());
}

/// Print usage after a wrong invocation.
pub fn print_usage() {
    println!("Wrong usage of idc-buildtask tool...");
    println!("Usage:");
    println!("Argument 1: Project IDP Build Task Name");
    println!("Argument 2: Project Name");
}
