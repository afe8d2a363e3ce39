use std::io::{BufRead, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read from terminal: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive questions the deployment flow asks. Injected so the
/// orchestrator stays testable without a terminal.
pub trait Prompter {
    /// Yes/no question. An empty answer takes the default.
    fn confirm(&self, message: &str, default: bool) -> Result<bool, Error>;

    /// Free-form answer. An empty answer takes the default when one is given.
    fn input(&self, message: &str, default: Option<&str>) -> Result<String, Error>;
}

/// Prompter over the process's own terminal.
pub struct StdPrompter;

impl StdPrompter {
    fn ask(&self, prompt: &str) -> Result<String, Error> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

impl Prompter for StdPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, Error> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let answer = self.ask(&format!("{message} ({hint}) "))?;
            match answer.to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("Please answer 'y' or 'n'."),
            }
        }
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, Error> {
        let prompt = match default {
            Some(default) => format!("{message} [{default}]: "),
            None => format!("{message}: "),
        };
        loop {
            let answer = self.ask(&prompt)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(default) = default {
                return Ok(default.to_string());
            }
            println!("A value is required.");
        }
    }
}
