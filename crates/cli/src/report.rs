//! Terminal rendering of a run or plan report.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use wpadvisory_sync_core::{EntryState, RunReport};

/// Print the entries that changed (or failed) followed by the totals.
pub fn print(report: &RunReport, plan: bool) {
    if report.disabled {
        println!("Run is disabled (run.enabled = false / IS_ENABLED=0); nothing was done.");
        return;
    }

    let changed: Vec<_> = report.changed().collect();
    println!();
    if changed.is_empty() {
        println!("No entries change the conflict section.");
    } else {
        println!("{}", table(&changed, plan));
    }

    println!();
    let elapsed = report
        .completed_at
        .map(|end| (end - report.started_at).num_seconds())
        .unwrap_or_default();
    if plan {
        println!(
            "{} entries, {} would change, {} unchanged ({}s)",
            report.entries.len(),
            report.count(EntryState::Changed),
            report.count(EntryState::NoOp),
            elapsed,
        );
    } else {
        println!(
            "{} entries, {} published, {} failed, {} unchanged ({}s)",
            report.entries.len(),
            report.count(EntryState::Done),
            report.count(EntryState::Failed),
            report.count(EntryState::NoOp),
            elapsed,
        );
    }
    if report.rejected_records > 0 {
        println!("{} malformed feed record(s) skipped", report.rejected_records);
    }
}

fn table(entries: &[&wpadvisory_sync_core::orchestrator::EntryOutcome], plan: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let last = if plan { "Written to" } else { "Result" };
    table.set_header(vec!["Entry", "Package", "Constraint", "State", last]);

    for entry in entries {
        let packages = entry
            .changes
            .iter()
            .map(|c| c.package.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let constraints = entry
            .changes
            .iter()
            .map(|c| c.constraint.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let state_cell = match entry.state {
            EntryState::Done => Cell::new("✓ done").fg(Color::Green),
            EntryState::Failed => Cell::new("✗ failed").fg(Color::Red),
            EntryState::Changed => Cell::new("⧗ changed").fg(Color::Yellow),
            other => Cell::new(other),
        };

        let result = if plan {
            entry
                .written_to
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "—".to_string())
        } else {
            entry
                .pull_request_url
                .clone()
                .or_else(|| entry.error.clone())
                .unwrap_or_else(|| "—".to_string())
        };

        table.add_row(vec![
            Cell::new(&entry.id),
            Cell::new(packages),
            Cell::new(constraints),
            state_cell,
            Cell::new(result),
        ]);
    }

    table
}
