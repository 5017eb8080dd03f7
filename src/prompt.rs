use std::io::{self, BufRead, Write};

use crate::errors::{Error, Result};
use crossterm::tty::IsTty;
use dialoguer::Input;

/// Asks the operator a yes/no question before a mutating step.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Reads the answer from stdin, with line editing when attached to a terminal.
/// Only an exact "Y" proceeds; any other answer declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Confirm for Console {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        if !io::stdin().is_tty() || !io::stderr().is_tty() {
            let stdin = io::stdin();
            return confirm_from(&mut stdin.lock(), &mut io::stderr(), question);
        }

        let answer: String = Input::new()
            .with_prompt(format!("{} (Y/N)", question))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::Other {
                message: format!("failed to read confirmation {}", e),
                retryable: false,
            })?;
        Ok(is_yes(&answer))
    }
}

/// Answers yes to every question.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        log::info!("auto-confirming '{}'", question);
        Ok(true)
    }
}

pub fn is_yes(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']) == "Y"
}

/// Writes the question and reads one line as the answer.
/// End of input declines.
pub fn confirm_from<R, W>(reader: &mut R, writer: &mut W, question: &str) -> Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(writer, "{} (Y/N): ", question)?;
    writer.flush()?;

    let mut answer = String::new();
    let n = reader.read_line(&mut answer)?;
    if n == 0 {
        log::warn!("no answer for '{}' (end of input)", question);
        return Ok(false);
    }
    Ok(is_yes(&answer))
}

/// Replays a fixed list of answers, declining once exhausted.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Scripted {
    pub answers: std::collections::VecDeque<bool>,
    pub asked: Vec<String>,
}

#[cfg(test)]
impl Scripted {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Confirm for Scripted {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front().unwrap_or(false))
    }
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- prompt::test_is_yes --exact --show-output
#[test]
fn test_is_yes() {
    assert!(is_yes("Y"));
    assert!(is_yes("Y\n"));
    assert!(!is_yes("y"));
    assert!(!is_yes("yes"));
    assert!(!is_yes(""));
    assert!(!is_yes("N"));

    assert!(AutoConfirm.confirm("Moving on?").unwrap());

    let mut s = Scripted::new(&[true]);
    assert!(s.confirm("first").unwrap());
    assert!(!s.confirm("second").unwrap());
    assert_eq!(s.asked, vec!["first", "second"]);
}

/// RUST_LOG=debug cargo test --package ebs-manager --lib -- prompt::test_confirm_from_reader --exact --show-output
#[test]
fn test_confirm_from_reader() {
    use std::io::Cursor;

    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let mut input = Cursor::new("Y\nn\nY\r\n");
    let mut prompts = Vec::new();
    assert!(confirm_from(&mut input, &mut prompts, "Moving on?").unwrap());
    assert!(!confirm_from(&mut input, &mut prompts, "Replace /dev/sdb?").unwrap());
    assert!(confirm_from(&mut input, &mut prompts, "Replace /dev/sdc?").unwrap());

    // exhausted input declines
    assert!(!confirm_from(&mut input, &mut prompts, "Replace /dev/sdd?").unwrap());

    let s = String::from_utf8(prompts).unwrap();
    assert!(s.starts_with("Moving on? (Y/N): Replace /dev/sdb? (Y/N): "));
    assert!(s.ends_with("Replace /dev/sdd? (Y/N): "));
}
