//! Terminal styling shared by the subcommands.

use console::Style;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark before `msg`.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// Red cross before `msg`.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

/// Yellow warning sign before `msg`.
pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Filled dot for a folder that exists on disk, hollow otherwise.
pub fn presence(exists: bool) -> String {
    if exists {
        Style::new().green().apply_to("●").to_string()
    } else {
        Style::new().dim().apply_to("○").to_string()
    }
}
