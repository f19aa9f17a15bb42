//! Interactive trial source: asks for counts on one stream, reads answers
//! from another.

use govseed_store::matrix::parse_count;
use govseed_store::{InputError, TrialSource};
use govseed_types::{TrialConfig, TrialSample};
use std::io::{BufRead, Write};

pub struct PromptSource<R, W> {
    input: R,
    output: W,
    // True once the user agreed to another trial and still owes valid counts.
    awaiting_counts: bool,
}

impl<R: BufRead, W: Write> PromptSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            awaiting_counts: false,
        }
    }

    /// `None` on end of input or a broken stream.
    fn ask(&mut self, question: &str) -> Option<String> {
        write!(self.output, "{}", question).ok()?;
        self.output.flush().ok()?;
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn report(&mut self, sample: &TrialSample) {
        let _ = writeln!(
            self.output,
            "{} ministries x {} departments: {:.2}s ({})",
            sample.ministries,
            sample.departments_per_ministry,
            sample.duration_secs,
            sample.outcome.label()
        );
    }

    fn reject(&mut self, err: InputError) -> InputError {
        let _ = writeln!(self.output, "Please enter valid integer values ({}).", err);
        err
    }
}

impl<R: BufRead, W: Write> TrialSource for PromptSource<R, W> {
    fn next_trial(
        &mut self,
        previous: Option<&TrialSample>,
    ) -> Option<Result<TrialConfig, InputError>> {
        if !self.awaiting_counts {
            if let Some(sample) = previous {
                self.report(sample);
                let answer = self.ask("Run another trial? [y/N] ")?;
                if !matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
                    return None;
                }
            }
            self.awaiting_counts = true;
        }

        let ministries = self.ask("Enter number of ministries to generate: ")?;
        let ministries = match parse_count(&ministries) {
            Ok(value) => value,
            Err(err) => return Some(Err(self.reject(err))),
        };
        let departments = self.ask("Enter number of departments per ministry: ")?;
        let departments = match parse_count(&departments) {
            Ok(value) => value,
            Err(err) => return Some(Err(self.reject(err))),
        };

        self.awaiting_counts = false;
        Some(Ok(TrialConfig::new(ministries, departments)))
    }
}
