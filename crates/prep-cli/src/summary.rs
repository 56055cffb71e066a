use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use prep_cli::tasks::{ExplainReport, FamilyRow, RefreshOutcome};
use prep_core::EligibilityExplanation;
use prep_match::KeywordMatch;
use prep_model::{IssueKind, RefreshResult};

pub fn print_refresh_summary(outcome: &RefreshOutcome) {
    let result = &outcome.result;
    if result.skipped {
        println!("No changes since the last refresh; nothing to do.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("Metric"), header_cell("Count")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    let changes = &result.changes;
    let rows = [
        ("Screening types modified", changes.screening_types_modified),
        ("Documents modified", changes.documents_modified),
        ("Patients modified", changes.patients_modified),
        ("Patients processed", result.patients_processed),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), count_cell(value, Color::Blue)]);
    }
    table.add_row(vec![
        Cell::new("Screenings created"),
        count_cell(result.screenings_created, Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("Screenings updated"),
        count_cell(result.screenings_updated, Color::Blue),
    ]);
    table.add_row(vec![
        Cell::new("Screenings deleted"),
        count_cell(result.screenings_deleted, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Errors").add_attribute(Attribute::Bold),
        count_cell(result.errors.len(), Color::Red).add_attribute(Attribute::Bold),
    ]);
    if changes.forced {
        println!("Forced refresh");
    }
    println!("{table}");
    if outcome.saved {
        println!("Dataset saved.");
    } else {
        println!("Dry run: dataset left unchanged.");
    }
    print_issue_table(result);
}

fn print_issue_table(result: &RefreshResult) {
    if result.errors.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Kind"),
        header_cell("Patient"),
        header_cell("Screening type"),
        header_cell("Message"),
    ]);
    apply_issue_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for issue in &result.errors {
        table.add_row(vec![
            kind_cell(issue.kind),
            optional_cell(issue.patient_id),
            optional_cell(issue.screening_type_id),
            Cell::new(&issue.message),
        ]);
    }
    println!();
    println!("Issues:");
    println!("{table}");
}

pub fn print_matches(matches: &[KeywordMatch]) {
    if matches.is_empty() {
        println!("No keyword matched.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Keyword"),
        header_cell("Confidence"),
        header_cell("Kind"),
        header_cell("Matched text"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for found in matches {
        table.add_row(vec![
            Cell::new(&found.keyword)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(format!("{:.2}", found.confidence)),
            Cell::new(format!("{:?}", found.kind)),
            Cell::new(&found.matched_text),
        ]);
    }
    println!("{table}");
}

pub fn print_explanation(report: &ExplainReport) {
    println!(
        "Patient {} / {} ({}) as of {}",
        report.patient_id, report.screening_type, report.screening_type_id, report.as_of
    );
    println!("{}", explanation_table(&report.explanation));
}

fn explanation_table(explanation: &EligibilityExplanation) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Rule"),
        header_cell("Result"),
        header_cell("Detail"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for check in &explanation.checks {
        let result = if check.passed {
            Cell::new("pass").fg(Color::Green)
        } else {
            Cell::new("fail")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        };
        table.add_row(vec![
            Cell::new(check.criterion.as_str()),
            result,
            Cell::new(&check.detail),
        ]);
    }
    let verdict = if explanation.eligible {
        Cell::new("ELIGIBLE").fg(Color::Green)
    } else {
        Cell::new("NOT ELIGIBLE").fg(Color::Red)
    };
    table.add_row(vec![
        Cell::new("overall").add_attribute(Attribute::Bold),
        verdict.add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

pub fn print_families(rows: &[FamilyRow]) {
    if rows.is_empty() {
        println!("No screening types for this tenant.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Family"),
        header_cell("ID"),
        header_cell("Name"),
        header_cell("Active"),
        header_cell("Specificity"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Center);
    align_column(&mut table, 4, CellAlignment::Right);
    let mut previous: Option<&str> = None;
    for row in rows {
        let family = if previous == Some(row.family.as_str()) {
            dim_cell("")
        } else if row.family_size > 1 {
            Cell::new(format!("{} ({})", row.family, row.family_size))
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new(&row.family)
        };
        previous = Some(row.family.as_str());
        table.add_row(vec![
            family,
            Cell::new(row.screening_type_id),
            Cell::new(&row.name),
            if row.active {
                Cell::new("✓").fg(Color::Green)
            } else {
                dim_cell("-")
            },
            match row.specificity {
                Some(score) => Cell::new(score),
                None => Cell::new("invalid").fg(Color::Red),
            },
        ]);
    }
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_issue_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn kind_cell(kind: IssueKind) -> Cell {
    match kind {
        IssueKind::Configuration => Cell::new("CONFIG")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        IssueKind::Evaluation => Cell::new("PATIENT").fg(Color::Yellow),
    }
}

fn optional_cell<T: ToString>(value: Option<T>) -> Cell {
    match value {
        Some(value) => Cell::new(value),
        None => dim_cell("-"),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
