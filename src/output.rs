//! User-facing status lines. Everything goes to stderr so command output on
//! stdout (`exec`, `logs`, `config show`) stays clean for piping.

use std::io::{self, Write};

use console::style;

pub fn info(msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    tracing::info!("{}", msg);
    eprintln!("{} {}", style("[INFO]").blue(), msg);
}

pub fn warn(msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    tracing::warn!("{}", msg);
    eprintln!("{} {}", style("[WARN]").yellow(), msg);
}

pub fn success(msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    tracing::info!("{}", msg);
    eprintln!("{} {}", style("✔").green(), style(msg).green().bold());
}

/// Ask a yes/no question; anything but `y`/`yes` declines.
pub fn confirm(question: &str) -> io::Result<bool> {
    print!(
        "{} {}{}{} ",
        question,
        style("[").bold().cyan(),
        style("y/N").bold(),
        style("]").bold().cyan(),
    );
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Prompt for a value, returning `default` on empty input.
pub fn prompt(question: &str, default: Option<&str>) -> io::Result<String> {
    match default {
        Some(d) if !d.is_empty() => print!("{} {} ", question, style(format!("[{}]", d)).dim()),
        _ => print!("{} ", question),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim();
    if answer.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}
