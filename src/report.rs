//! Run reporting.
//!
//! - `TextReporter` — one line per check as it runs, colored PASS/FAIL/SKIP,
//!   then the passed/failed summary.
//! - `JsonReporter` — the full `RunSummary` as a single JSON document.

use crate::models::{
    check::CheckSpec,
    outcome::{CheckOutcome, CheckStatus, RunSummary},
};
use std::io::{self, Write};

/// Receives progress from a running suite.
pub trait Reporter {
    fn start(&mut self, summary: &RunSummary) -> io::Result<()>;
    fn check_started(&mut self, spec: &CheckSpec) -> io::Result<()>;
    fn check_finished(&mut self, outcome: &CheckOutcome) -> io::Result<()>;
    fn finish(&mut self, summary: &RunSummary) -> io::Result<()>;
}

const RULE: &str = "========================================";

/// Human-readable report.
pub struct TextReporter<W> {
    out: W,
    use_colors: bool,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W, use_colors: bool) -> Self {
        Self { out, use_colors }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_colors {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }

    fn green(&self, s: &str) -> String {
        self.paint("32", s)
    }

    fn red(&self, s: &str) -> String {
        self.paint("31", s)
    }

    fn yellow(&self, s: &str) -> String {
        self.paint("33", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn start(&mut self, summary: &RunSummary) -> io::Result<()> {
        let title = self.bold("AWS Credential Check");
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "{title} (region {})", summary.region)?;
        if let Some(arn) = &summary.caller_arn {
            writeln!(self.out, "Caller identity: {arn}")?;
        }
        writeln!(self.out, "{RULE}")?;
        self.out.flush()
    }

    fn check_started(&mut self, spec: &CheckSpec) -> io::Result<()> {
        write!(self.out, "Testing {}... ", spec.name)?;
        self.out.flush()
    }

    fn check_finished(&mut self, outcome: &CheckOutcome) -> io::Result<()> {
        let label = match outcome.status {
            CheckStatus::Pass => self.green("PASS"),
            CheckStatus::Fail => self.red("FAIL"),
            CheckStatus::Skip => self.yellow("SKIP"),
        };
        writeln!(self.out, "{label}")?;

        if let Some(failure) = &outcome.failure {
            let hint = if failure.message.is_empty() {
                format!("{}: {}", failure.kind, outcome.command)
            } else {
                format!("{}: {}", failure.kind, failure.message)
            };
            let hint = self.dim(&hint);
            writeln!(self.out, "    {hint}")?;
        }
        self.out.flush()
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        let passed = self.green(&format!("Tests Passed: {}", summary.passed));
        let failed = if summary.failed > 0 {
            self.red(&format!("Tests Failed: {}", summary.failed))
        } else {
            format!("Tests Failed: {}", summary.failed)
        };

        writeln!(self.out)?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "{passed}")?;
        writeln!(self.out, "{failed}")?;
        if summary.skipped > 0 {
            let skipped = self.yellow(&format!("Tests Skipped: {}", summary.skipped));
            writeln!(self.out, "{skipped}")?;
        }
        writeln!(self.out, "{RULE}")?;

        let verdict = if summary.all_passed() {
            self.green("All checks passed")
        } else {
            self.red("Some checks failed")
        };
        writeln!(self.out, "{verdict}")?;
        self.out.flush()
    }
}

/// Machine-readable report, written once the run is complete.
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn start(&mut self, _summary: &RunSummary) -> io::Result<()> {
        Ok(())
    }

    fn check_started(&mut self, _spec: &CheckSpec) -> io::Result<()> {
        Ok(())
    }

    fn check_finished(&mut self, _outcome: &CheckOutcome) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, summary)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Print the plan for `--list`.
pub fn render_plan<'a, W, I>(out: &mut W, checks: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a CheckSpec>,
{
    for (idx, check) in checks.into_iter().enumerate() {
        let marker = if check.mutates { " (writes)" } else { "" };
        writeln!(out, "{:>2}. [{}] {}{}", idx + 1, check.service, check.name, marker)?;
        writeln!(out, "      {}", check.command_line())?;
    }
    Ok(())
}

/// Print the plan for `--list --format json` as a JSON array of checks.
pub fn render_plan_json<'a, W, I>(out: &mut W, checks: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a CheckSpec>,
{
    let checks: Vec<&CheckSpec> = checks.into_iter().collect();
    serde_json::to_writer_pretty(&mut *out, &checks)?;
    writeln!(out)?;
    out.flush()
}
