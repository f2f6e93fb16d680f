use std::io::Write;

use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Outcome tag shown on a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Done,
    Skip,
    Warn,
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Done => "[  DONE  ]",
            StageStatus::Skip => "[  SKIP  ]",
            StageStatus::Warn => "[  WARN  ]",
        }
    }
}

const BANNER_WIDTH: usize = 70;

/// Print a centered banner between separator rules.
pub fn print_banner(w: &mut dyn Write, text: &str) -> std::io::Result<()> {
    let upper = text.to_uppercase();
    writeln!(w, "\n{}", "=".repeat(BANNER_WIDTH))?;
    writeln!(w, "{:^BANNER_WIDTH$}", upper)?;
    writeln!(w, "{}\n", "=".repeat(BANNER_WIDTH))?;
    Ok(())
}

/// Print a standardized step indicator.
pub fn print_step(w: &mut dyn Write, current: usize, total: usize, description: &str) -> std::io::Result<()> {
    writeln!(w, "[{}/{}] {}...", current, total, description)
}

/// Print a status line with a visual indicator.
pub fn print_status(
    w: &mut dyn Write,
    label: &str,
    message: &str,
    status: StageStatus,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        let tag = match status {
            StageStatus::Done => status.label().green().to_string(),
            StageStatus::Skip => status.label().dimmed().to_string(),
            StageStatus::Warn => status.label().yellow().to_string(),
        };
        writeln!(w, "      {} {}: {}", tag, label, message)
    } else {
        writeln!(w, "      {} {}: {}", status.label(), label, message)
    }
}

/// Print data in a clean ASCII table.
pub fn print_table(w: &mut dyn Write, headers: &[&str], rows: &[Vec<String>]) -> std::io::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for i in 0..cols {
            if let Some(cell) = row.get(i) {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut header_line = String::from("  ");
    let mut sep_line = String::from("  ");
    for i in 0..cols {
        header_line.push_str(&format!("{:<width$}", headers[i], width = widths[i] + 3));
        sep_line.push_str(&"-".repeat(widths[i] + 1));
        sep_line.push_str("  ");
    }
    writeln!(w, "\n{}", header_line.trim_end())?;
    writeln!(w, "{}", sep_line.trim_end())?;

    for row in rows {
        let mut line = String::from("  ");
        for i in 0..cols {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!("{:<width$}", cell, width = widths[i] + 3));
        }
        writeln!(w, "{}", line.trim_end())?;
    }
    writeln!(w)?;
    Ok(())
}

/// Format a duration in seconds to a short human-readable string.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else {
        format!("{}m {}s", seconds / 60, seconds % 60)
    }
}
