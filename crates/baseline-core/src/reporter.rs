//! The reporter: per-control outcomes → `RunReport`, and its renderings.
//!
//! Pure aggregation. Nothing here touches the account or the filesystem.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use baseline_contracts::{
    control::Control,
    decision::Decision,
    report::{ControlOutcome, ReportEntry, RunId, RunMode, RunReport},
};

use crate::reconciler::{MANUAL_CHANGE, NOT_MANAGED};

/// Build the report entry for one control.
///
/// Outcomes that need operator attention get a remediation hint: the
/// catalog's own hint when it has one, otherwise a generic one.
pub fn entry(control: &Control, outcome: ControlOutcome, attempts: u32) -> ReportEntry {
    let remediation = needs_attention(&outcome).then(|| {
        control
            .remediation
            .clone()
            .unwrap_or_else(|| generic_hint(control, &outcome))
    });

    ReportEntry {
        control_id: control.id.clone(),
        category: control.category,
        resource: control.resource_ref(),
        outcome,
        attempts,
        remediation,
    }
}

/// Assemble the final report. `success` is derived from the entries.
pub fn finish(
    run_id: RunId,
    mode: RunMode,
    started_at: DateTime<Utc>,
    entries: Vec<ReportEntry>,
    interrupted: bool,
) -> RunReport {
    let success = RunReport::compute_success(&entries);
    RunReport {
        run_id,
        mode,
        started_at,
        finished_at: Utc::now(),
        entries,
        success,
        interrupted,
        journal_error: None,
    }
}

fn needs_attention(outcome: &ControlOutcome) -> bool {
    matches!(
        outcome,
        ControlOutcome::Skipped { .. } | ControlOutcome::Unresolvable { .. } | ControlOutcome::Failed { .. }
    )
}

fn generic_hint(control: &Control, outcome: &ControlOutcome) -> String {
    let target = control.resource_ref();
    match outcome {
        ControlOutcome::Unresolvable { reason } if reason == MANUAL_CHANGE => format!(
            "{} was changed outside the baseline; revert the change by hand or delete the resource so the next run recreates it",
            target
        ),
        ControlOutcome::Unresolvable { reason } if reason == NOT_MANAGED => format!(
            "{} was not created by this baseline; remove it by hand if it is no longer needed",
            target
        ),
        ControlOutcome::Unresolvable { .. } => format!(
            "check the credentials and permissions used to read {}, then re-run",
            control.kind
        ),
        ControlOutcome::Failed { retryable: true, .. } => {
            "re-run; the next run re-inspects the resource before acting".to_string()
        }
        ControlOutcome::Failed { retryable: false, .. } => {
            "fix the cause above, then re-run".to_string()
        }
        ControlOutcome::Skipped { .. } => {
            "resolve the blocking control first; this one is retried on the next run".to_string()
        }
        ControlOutcome::NoActionNeeded
        | ControlOutcome::Planned { .. }
        | ControlOutcome::Applied { .. } => String::new(),
    }
}

/// Render the report as an aligned text table followed by a summary line.
pub fn render_human(report: &RunReport) -> String {
    let id_width = report
        .entries
        .iter()
        .map(|e| e.control_id.as_str().len())
        .max()
        .unwrap_or(0)
        .max("CONTROL".len());
    let res_width = report
        .entries
        .iter()
        .map(|e| e.resource.to_string().len())
        .max()
        .unwrap_or(0)
        .max("RESOURCE".len());

    let mut out = String::new();
    let _ = writeln!(out, "{} run {}", mode_label(report.mode), report.run_id.0);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {:<id_width$}  {:<res_width$}  {:<16}  DETAIL",
        "CONTROL", "RESOURCE", "OUTCOME"
    );

    for e in &report.entries {
        let _ = writeln!(
            out,
            "  {:<id_width$}  {:<res_width$}  {:<16}  {}",
            e.control_id.as_str(),
            e.resource.to_string(),
            e.outcome.label(),
            detail(&e.outcome, e.attempts)
        );
        if let Some(hint) = &e.remediation {
            let _ = writeln!(out, "  {:<id_width$}  ↳ {}", "", hint);
        }
    }

    let c = report.counts();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} no action, {} planned, {} applied, {} skipped, {} unresolvable, {} failed",
        c.no_action_needed, c.planned, c.applied, c.skipped, c.unresolvable, c.failed
    );
    if report.interrupted {
        let _ = writeln!(out, "run interrupted before every control was processed");
    }
    if let Some(reason) = &report.journal_error {
        let _ = writeln!(out, "journal: FAILED to finalize: {}", reason);
    }
    let verdict = if report.fully_succeeded() {
        "converged"
    } else if report.success && report.journal_error.is_none() {
        "incomplete, re-run to finish"
    } else {
        "FAILED"
    };
    let _ = writeln!(out, "result: {}", verdict);
    out
}

/// Render the report as pretty-printed JSON.
pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn mode_label(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Plan => "plan",
        RunMode::Apply => "apply",
        RunMode::Teardown => "teardown",
    }
}

fn detail(outcome: &ControlOutcome, attempts: u32) -> String {
    match outcome {
        ControlOutcome::NoActionNeeded => String::new(),
        ControlOutcome::Planned { decision } => match decision {
            Decision::Update { diff } => format!("update {}", diff.attributes().join(", ")),
            Decision::Create => "create".to_string(),
            Decision::Remove => "delete".to_string(),
            Decision::NoActionNeeded | Decision::Unresolvable { .. } => String::new(),
        },
        ControlOutcome::Applied { operation } if attempts > 1 => {
            format!("{} ({} attempts)", operation, attempts)
        }
        ControlOutcome::Applied { operation } => operation.to_string(),
        ControlOutcome::Skipped { reason } | ControlOutcome::Unresolvable { reason } => {
            reason.clone()
        }
        ControlOutcome::Failed { cause, retryable: true } => format!("{} (retryable)", cause),
        ControlOutcome::Failed { cause, .. } => cause.clone(),
    }
}
