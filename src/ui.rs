use colored::Colorize;

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a per-host line: `  host  message`
pub fn host_line(host: &str, ok: bool, msg: &str) {
    let mark = if ok { "✓".green() } else { "✗".red() };
    println!("  {mark} {}  {msg}", host.bold());
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Comma-joined list, or a dimmed dash when empty
pub fn list(items: &[String]) -> String {
    if items.is_empty() {
        "-".dimmed().to_string()
    } else {
        items.join(", ")
    }
}
