use crate::host::Confirm;
use async_trait::async_trait;
use pvedeploy_common::prelude::{Error, Result};
use std::io::{BufRead, Write};

/// Confirms every question, for `--yes` runs.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, question: &str) -> Result<bool> {
        tracing::info!(target: "machine", question, "Confirmed without asking");
        Ok(true)
    }
}

/// Asks on the terminal, anything but `y`/`yes` declines.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        let question = question.to_owned();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut stdout = std::io::stdout();
            write!(stdout, "{} [y/N] ", question)?;
            stdout.flush()?;

            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok(is_yes(&answer))
        })
        .await
        .map_err(|error| Error::Any(error.to_string()))?
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
