//! Append-only terminal rendering of a run.
//!
//! Snapshots arrive repeatedly and mostly unchanged, so the presenter tracks
//! how far it has already drawn and only writes what is new.

use std::io::{self, Write};

use agent_core::{Decision, Outcome, Presenter, RunState, StageCatalog};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{scalar_text, sort_by_idoc_number, Record, ReconciliationResult, UpdateStatus},
    error::FailureKind,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;
use uuid::Uuid;

const REPROCESS_PROMPT: &str = "DO YOU WANT TO REPROCESS? [yes/no]";
const DEFAULT_UPDATED_TABLE_TITLE: &str = "Updated Master Data Table";

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

/// What has already been written for the current run.
#[derive(Debug, Default)]
struct Progress {
    run_id: Option<Uuid>,
    announced: bool,
    headings: usize,
    results: usize,
    concluded: bool,
}

pub struct TerminalPresenter<W> {
    out: W,
    catalog: StageCatalog,
    decision: Option<Decision>,
    input: Option<Input>,
    progress: Progress,
}

impl<W: Write + Send> TerminalPresenter<W> {
    pub fn new(out: W, catalog: StageCatalog) -> Self {
        Self {
            out,
            catalog,
            decision: None,
            input: None,
            progress: Progress::default(),
        }
    }

    /// Answers the reprocess prompt without asking.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Reads the reprocess answer from `input`, one line at a time.
    pub fn with_input(mut self, input: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    fn draw(&mut self, snapshot: &RunState) -> io::Result<()> {
        if snapshot.run_id != self.progress.run_id {
            self.progress = Progress {
                run_id: snapshot.run_id,
                ..Progress::default()
            };
        }
        if snapshot.run_id.is_none() || self.progress.concluded {
            return Ok(());
        }

        if !self.progress.announced {
            writeln!(self.out, "> Checking the IDOC backlog for failed records...")?;
            self.progress.announced = true;
        }

        let visible = snapshot.stages.iter().take_while(|slot| slot.status.visible).count();
        while self.progress.headings < visible {
            let order = self.progress.headings;
            if let Some(stage) = self.catalog.get(order) {
                writeln!(self.out)?;
                writeln!(self.out, "## {}", stage.title)?;
                if !stage.running_message.is_empty() {
                    writeln!(self.out, "   {}", stage.running_message)?;
                }
            }
            self.progress.headings += 1;
        }

        let done = snapshot.stages.iter().take_while(|slot| slot.status.is_done()).count();
        while self.progress.results < done {
            let order = self.progress.results;
            if let Some(output) = snapshot.stages[order].output.as_ref() {
                self.write_stage_output(output, snapshot)?;
            }
            self.progress.results += 1;
        }

        if snapshot.is_terminal() {
            writeln!(self.out)?;
            self.write_outcome(snapshot)?;
            self.progress.concluded = true;
        }
        self.out.flush()
    }

    fn write_stage_output(&mut self, output: &Value, snapshot: &RunState) -> io::Result<()> {
        match output.get("display").and_then(Value::as_str) {
            Some("counts") => {
                self.write_result_fields(output)?;
                writeln!(
                    self.out,
                    "   Total Success: {}   Total Error: {}",
                    snapshot.success_count, snapshot.failure_count
                )
            }
            Some("backlog") => {
                if let Some(title) = output.get("table_title").and_then(Value::as_str) {
                    writeln!(self.out, "{title}")?;
                }
                write_table(&mut self.out, &snapshot.backlog)?;
                if let Some(title) = output.get("command_title").and_then(Value::as_str) {
                    writeln!(self.out, "{title}")?;
                }
                if let Some(command) = output.get("command").and_then(Value::as_str) {
                    writeln!(self.out, "   {command}")?;
                }
                Ok(())
            }
            _ => self.write_result_fields(output),
        }
    }

    /// Draws the well-known result fields; anything else is shown as JSON.
    fn write_result_fields(&mut self, output: &Value) -> io::Result<()> {
        let Value::Object(fields) = output else {
            return writeln!(self.out, "   {}", scalar_text(output));
        };

        let mut drawn = false;
        if let Some(result) = fields.get("result") {
            writeln!(self.out, "   {}", scalar_text(result))?;
            drawn = true;
        }
        if let Some(Value::Array(incidents)) = fields.get("incidents") {
            for incident in incidents {
                write_incident(&mut self.out, incident)?;
            }
            drawn = true;
        }
        if let Some(Value::Array(analysis)) = fields.get("analysis") {
            writeln!(self.out, "   Previous Ticket Analysis:")?;
            for item in analysis {
                writeln!(self.out, "   - {}", scalar_text(item))?;
            }
            drawn = true;
        }
        if let Some(conclusion) = fields.get("conclusion") {
            writeln!(self.out, "   {}", scalar_text(conclusion))?;
            drawn = true;
        }

        if !drawn && !fields.is_empty() {
            let pretty = serde_json::to_string_pretty(output).map_err(io::Error::other)?;
            for line in pretty.lines() {
                writeln!(self.out, "   {line}")?;
            }
        }
        Ok(())
    }

    fn write_outcome(&mut self, snapshot: &RunState) -> io::Result<()> {
        match snapshot.outcome {
            Some(Outcome::NoIssues) => {
                writeln!(self.out, "No IDOC Issues Found")?;
                writeln!(self.out, "   Total Success: {}", snapshot.success_count)?;
                writeln!(self.out, "   Total Error: {}", snapshot.failure_count)
            }
            Some(Outcome::Unreachable) => {
                let reason = snapshot
                    .failure(FailureKind::FetchFailure)
                    .map(|failure| failure.message.as_str())
                    .unwrap_or("no response");
                writeln!(self.out, "The IDOC service could not be reached: {reason}")
            }
            Some(Outcome::Declined) => {
                writeln!(self.out, "Thank you for choosing SAP Support!")?;
                writeln!(self.out, "We're glad we could help you with your IDOC inquiry.")
            }
            Some(Outcome::Reconciled) => self.write_reconciliation(snapshot),
            None => Ok(()),
        }
    }

    fn write_reconciliation(&mut self, snapshot: &RunState) -> io::Result<()> {
        if let Some(failure) = snapshot.failure(FailureKind::UpdateFailure) {
            writeln!(self.out, "Reprocessing failed: {}", failure.message)?;
        } else {
            write_reconciliation_results(&mut self.out, &snapshot.reconciliation)?;
        }

        writeln!(self.out)?;
        writeln!(self.out, "{}", updated_table_title(snapshot))?;
        if let Some(failure) = snapshot.failure(FailureKind::ReconciledFetchFailure) {
            writeln!(self.out, "   Could not load the updated records: {}", failure.message)
        } else {
            write_table(&mut self.out, &snapshot.reconciled_backlog)
        }
    }

    async fn read_decision(&mut self) -> io::Result<Option<Decision>> {
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };

        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            match line.parse::<Decision>() {
                Ok(decision) => return Ok(Some(decision)),
                Err(_) => {
                    write!(self.out, "Please answer yes or no: ")?;
                    self.out.flush()?;
                }
            }
        }
    }
}

#[async_trait]
impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    async fn render(&mut self, snapshot: &RunState) {
        if let Err(error) = self.draw(snapshot) {
            warn!(%error, "could not write to terminal");
        }
    }

    async fn choose(&mut self, _snapshot: &RunState) -> Decision {
        let _ = writeln!(self.out);
        let _ = write!(self.out, "{REPROCESS_PROMPT} ");
        let _ = self.out.flush();

        if let Some(decision) = self.decision {
            let _ = writeln!(self.out, "{}", answer_text(decision));
            return decision;
        }

        match self.read_decision().await {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                warn!("no answer to the reprocess prompt; declining");
                Decision::Decline
            }
            Err(error) => {
                warn!(%error, "could not read the reprocess answer; declining");
                Decision::Decline
            }
        }
    }
}

fn answer_text(decision: Decision) -> &'static str {
    match decision {
        Decision::Reprocess => "yes",
        Decision::Decline => "no",
    }
}

fn updated_table_title(snapshot: &RunState) -> &str {
    snapshot
        .stages
        .iter()
        .filter_map(|slot| slot.output.as_ref())
        .find(|output| output.get("display").and_then(Value::as_str) == Some("backlog"))
        .and_then(|output| output.get("updated_table_title"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_UPDATED_TABLE_TITLE)
}

fn write_incident(out: &mut impl Write, incident: &Value) -> io::Result<()> {
    let text = |value: &Value, key: &str| value.get(key).map(scalar_text).unwrap_or_default();
    let sap = incident.get("sap_details").unwrap_or(&Value::Null);

    writeln!(out, "   Similar Incident Found:")?;
    writeln!(out, "     Incident Number: {}", text(incident, "incident_number"))?;
    writeln!(out, "     Error Message: {}", text(incident, "error_message"))?;
    writeln!(out, "     SAP Details:")?;
    writeln!(out, "       SAP Id: {}", text(sap, "sap_id"))?;
    writeln!(out, "       SAP Module: {}", text(sap, "sap_module"))?;
    writeln!(out, "       System/Client: {}", text(sap, "system_client"))
}

fn write_reconciliation_results(
    out: &mut impl Write,
    results: &[ReconciliationResult],
) -> io::Result<()> {
    if results.is_empty() {
        return writeln!(
            out,
            "No mismatches were reported between the IDOC data and the sales data."
        );
    }

    writeln!(
        out,
        "The following mismatches were found between the IDOC data and the sales data, and they have been updated:"
    )?;
    for (index, result) in results.iter().enumerate() {
        writeln!(out, "{}. IDOC Number: {}", index + 1, result.record_key)?;
        for update in &result.field_updates {
            let value = scalar_text(&update.new_value);
            match update.status {
                UpdateStatus::Updated => {
                    let previous = update
                        .previous_value
                        .as_ref()
                        .map(scalar_text)
                        .unwrap_or_default();
                    writeln!(
                        out,
                        "   - {}: `{value}` (was updated to match from `{previous}`)",
                        update.field
                    )?;
                }
                UpdateStatus::Matched => {
                    writeln!(out, "   - {}: `{value}` (matched)", update.field)?;
                }
            }
        }
    }
    writeln!(
        out,
        "These discrepancies have been successfully reconciled to ensure data consistency between the IDOC and sales records."
    )
}

/// Plain-text table ordered by IDOC number. Columns come from the first row.
fn write_table(out: &mut impl Write, records: &[Record]) -> io::Result<()> {
    let mut rows = records.to_vec();
    sort_by_idoc_number(&mut rows);

    let Some(first) = rows.first() else {
        return writeln!(out, "   No data available");
    };
    let keys: Vec<&String> = first.fields().keys().collect();
    let headers: Vec<String> = first
        .headers()
        .into_iter()
        .map(|header| header.to_uppercase())
        .collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            keys.iter()
                .map(|key| row.get(key.as_str()).map(scalar_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            cells
                .iter()
                .map(|row| row[column].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    write_row(out, &headers, &widths)?;
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    write_row(out, &rule, &widths)?;
    for row in &cells {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

fn write_row(out: &mut impl Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    writeln!(out, "   | {} |", padded.join(" | "))
}

#[cfg(test)]
#[path = "tests/presenter_tests.rs"]
mod tests;
