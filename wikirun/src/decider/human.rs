//! Interactive player reading choices from a terminal.

use std::io::{BufRead, BufReader, Stdin, Stdout, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::types::{GameStep, StepMetadata};

use super::{Decider, Decision};

/// Presents the numbered links and blocks until the operator picks one.
///
/// Unparseable or out-of-range input re-prompts; end of input gives up the move.
pub struct HumanDecider<R, W> {
    name: String,
    input: R,
    output: W,
}

impl HumanDecider<BufReader<Stdin>, Stdout> {
    pub fn stdio(name: impl Into<String>) -> Self {
        Self::new(name, BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead + Send, W: Write + Send> HumanDecider<R, W> {
    pub fn new(name: impl Into<String>, input: R, output: W) -> Self {
        Self {
            name: name.into(),
            input,
            output,
        }
    }

    fn prompt_for_choice(&mut self, links: &[String]) -> Result<Decision> {
        writeln!(self.output, "Link choices:")?;
        for (index, link) in links.iter().enumerate() {
            writeln!(self.output, "{}: {}", index + 1, link)?;
        }

        let mut tries = 0u32;
        loop {
            write!(
                self.output,
                "Enter the number of the link you want to select (1-{}): ",
                links.len()
            )?;
            self.output.flush().context("flush prompt")?;
            tries += 1;

            let mut line = String::new();
            let read = self.input.read_line(&mut line).context("read choice")?;
            if read == 0 {
                return Ok(Decision::no_move(StepMetadata {
                    message: Some(format!("{} closed input", self.name)),
                    tries: Some(tries),
                    ..StepMetadata::default()
                }));
            }

            match line.trim().parse::<usize>() {
                Ok(choice) if (1..=links.len()).contains(&choice) => {
                    return Ok(Decision::link(
                        links[choice - 1].clone(),
                        StepMetadata {
                            message: Some(format!("{} selected link #{choice}", self.name)),
                            tries: Some(tries),
                            ..StepMetadata::default()
                        },
                    ));
                }
                _ => writeln!(
                    self.output,
                    "Please enter a number between 1 and {}.",
                    links.len()
                )?,
            }
        }
    }
}

#[async_trait]
impl<R: BufRead + Send, W: Write + Send> Decider for HumanDecider<R, W> {
    async fn get_move(&mut self, history: &[GameStep]) -> Result<Decision> {
        let current = history.last().context("move requested with empty history")?;
        if current.links.is_empty() {
            return Ok(Decision::no_move(StepMetadata::message(format!(
                "{} has no links to choose from",
                self.name
            ))));
        }
        self.prompt_for_choice(&current.links)
    }
}
