use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use crossterm::style::Stylize;

use grid_editor::cell_renderer::RenderNode;
use grid_editor::grid_session::GridSession;
use grid_editor::services::filter_values::FilterValueSet;

fn badge_color(name: &str) -> Color {
    match name {
        "green" => Color::Green,
        "red" => Color::Red,
        "blue" => Color::Blue,
        "amber" => Color::Yellow,
        _ => Color::Grey,
    }
}

fn to_cell(node: &RenderNode) -> Cell {
    match node {
        RenderNode::Empty => Cell::new(""),
        RenderNode::Text(s) => Cell::new(s),
        RenderNode::Numeric(s) => Cell::new(s).set_alignment(CellAlignment::Right),
        RenderNode::Badge { label, color } => Cell::new(label).fg(badge_color(color)),
        RenderNode::Link { label, .. } => Cell::new(label).add_attribute(Attribute::Underlined),
    }
}

/// Print the session's current render window
pub fn display_window(session: &GridSession) {
    let rows = session.render_window();
    if rows.is_empty() {
        println!("{}", "No rows in view.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut headers = vec![Cell::new("").add_attribute(Attribute::Bold)];
    headers.extend(
        session
            .window_columns()
            .iter()
            .map(|c| Cell::new(&c.title).add_attribute(Attribute::Bold)),
    );
    table.set_header(headers);

    let selection = session.state().selection();
    let active = session.state().active_cell();
    for row in &rows {
        let marker = if selection.contains(&row.row_id) { "[x]" } else { "[ ]" };
        let mut cells = vec![Cell::new(marker)];
        for (column_id, node) in &row.cells {
            let mut cell = to_cell(node);
            if active.map(|a| a.row_id == row.row_id && &a.column_id == column_id).unwrap_or(false) {
                cell = cell.add_attribute(Attribute::Reverse);
            }
            cells.push(cell);
        }
        table.add_row(cells);
    }

    let window = session.window();
    println!("{table}");
    println!(
        "{}",
        format!(
            "rows {}..{} of {} | canvas {}x{}px | undo {} / redo {}",
            window.rows.start,
            window.rows.end,
            session.state().row_count(),
            session.viewport().total_width(),
            session.viewport().total_height(),
            session.history().undo_len(),
            session.history().redo_len()
        )
        .green()
    );
}

pub fn display_filter_values(set: &FilterValueSet) {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new(format!("{} values", set.column_id)).add_attribute(Attribute::Bold),
        Cell::new("count").add_attribute(Attribute::Bold),
    ]);
    for entry in &set.values {
        table.add_row(vec![Cell::new(&entry.value), Cell::new(entry.count)]);
    }
    println!("{table}");
    println!(
        "{}",
        format!("{} row(s) scanned{}", set.rows_scanned, if set.capped { ", capped" } else { "" })
            .green()
    );
}
