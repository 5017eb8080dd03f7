use std::io::{self, Write};

use chrono::{DateTime, Utc};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    tty::IsTty,
};

/// Prints a section header, e.g., "===== Checking i-abcd1234 =====".
/// Green when stdout is a terminal.
pub fn header<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    write_line(out, text, Color::Green, io::stdout().is_tty())
}

/// Prints an operator warning, in red when stdout is a terminal.
pub fn warn<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    write_line(out, text, Color::Red, io::stdout().is_tty())
}

fn write_line<W: Write>(out: &mut W, text: &str, color: Color, colored: bool) -> io::Result<()> {
    if !colored {
        return write!(out, "\n{}\n", text);
    }
    execute!(
        out,
        SetForegroundColor(color),
        Print(format!("\n{}\n", text)),
        ResetColor
    )
}

/// Formats the time of day as "%H:%M:%S", or "-" if unknown.
pub fn hms(dt: Option<&DateTime<Utc>>) -> String {
    match dt {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => String::from("-"),
    }
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- console::test_hms --exact --show-output
#[test]
fn test_hms() {
    use chrono::TimeZone;

    let dt = Utc.with_ymd_and_hms(2022, 3, 1, 12, 6, 19).unwrap();
    assert_eq!(hms(Some(&dt)), "12:06:19");
    assert_eq!(hms(None), "-");

    let mut out = Vec::new();
    header(&mut out, "===== Checking i-abcd1234 =====").unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s.contains("===== Checking i-abcd1234 ====="));
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- console::test_write_line_plain --exact --show-output
#[test]
fn test_write_line_plain() {
    let mut out = Vec::new();
    write_line(
        &mut out,
        "!!! Please stop the instance !!!",
        Color::Red,
        false,
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\n!!! Please stop the instance !!!\n"
    );

    let mut out = Vec::new();
    write_line(
        &mut out,
        "===== Checking i-abcd1234 =====",
        Color::Green,
        true,
    )
    .unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s.starts_with('\x1b'));
    assert!(s.contains("\n===== Checking i-abcd1234 =====\n"));
}
