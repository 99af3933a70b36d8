//! Option pickers used to choose the inference method and arbitration mode at startup.

use intent_core::InferenceKind;
use std::collections::VecDeque;
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use thiserror::Error;

use crate::arbitration::Arbitration;

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("menu has no options to choose from")]
    NoOptions,
    #[error("menu was closed before a choice was made")]
    Closed,
    #[error("choice {choice} is outside the {count} available options")]
    OutOfRange { choice: usize, count: usize },
    #[error("menu i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Presents a caption and a list of labels and returns the index of the chosen label.
pub trait OptionMenu {
    fn choose(&mut self, caption: &str, labels: &[&str]) -> Result<usize, MenuError>;
}

/// Line-oriented picker over any reader/writer pair.
pub struct TerminalMenu<R, W> {
    input: R,
    output: W,
}

impl TerminalMenu<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalMenu<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn parse(raw: &str, labels: &[&str]) -> Option<usize> {
        let trimmed = raw.trim();
        if let Ok(number) = trimmed.parse::<usize>() {
            return (1..=labels.len()).contains(&number).then(|| number - 1);
        }
        labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(trimmed))
    }
}

impl<R: BufRead, W: Write> OptionMenu for TerminalMenu<R, W> {
    fn choose(&mut self, caption: &str, labels: &[&str]) -> Result<usize, MenuError> {
        if labels.is_empty() {
            return Err(MenuError::NoOptions);
        }
        writeln!(self.output, "{caption}")?;
        for (idx, label) in labels.iter().enumerate() {
            writeln!(self.output, "  {}. {label}", idx + 1)?;
        }
        let mut line = String::new();
        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(MenuError::Closed);
            }
            match Self::parse(&line, labels) {
                Some(choice) => return Ok(choice),
                None => writeln!(
                    self.output,
                    "'{}' is not an option; enter 1-{} or a label",
                    line.trim(),
                    labels.len()
                )?,
            }
        }
    }
}

/// Replays a fixed sequence of choices; runs out as if the menu were closed.
#[derive(Debug, Default, Clone)]
pub struct ScriptedMenu {
    choices: VecDeque<usize>,
}

impl ScriptedMenu {
    pub fn new(choices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            choices: choices.into_iter().collect(),
        }
    }
}

impl OptionMenu for ScriptedMenu {
    fn choose(&mut self, _caption: &str, labels: &[&str]) -> Result<usize, MenuError> {
        if labels.is_empty() {
            return Err(MenuError::NoOptions);
        }
        let choice = self.choices.pop_front().ok_or(MenuError::Closed)?;
        if choice >= labels.len() {
            return Err(MenuError::OutOfRange {
                choice,
                count: labels.len(),
            });
        }
        Ok(choice)
    }
}

pub fn choose_inference<M: OptionMenu + ?Sized>(menu: &mut M) -> Result<InferenceKind, MenuError> {
    let labels: Vec<&str> = InferenceKind::ALL.iter().map(|kind| kind.label()).collect();
    let idx = menu.choose("Select the inference method", &labels)?;
    Ok(InferenceKind::ALL[idx])
}

pub fn choose_arbitration<M: OptionMenu + ?Sized>(menu: &mut M) -> Result<Arbitration, MenuError> {
    let labels: Vec<&str> = Arbitration::ALL.iter().map(|mode| mode.label()).collect();
    let idx = menu.choose("Select the arbitration mode", &labels)?;
    Ok(Arbitration::ALL[idx])
}
