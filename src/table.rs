use std::fmt::Write as _;

/// Plain-text table with two-space column gaps. Numeric cells are
/// right-aligned, everything else left-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|header| header.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&header_cells, &widths));
    let rule = widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let line = widths
        .iter()
        .zip(cells)
        .map(|(width, cell)| {
            let cell = flatten(cell);
            if is_numeric(&cell) {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

fn is_numeric(cell: &str) -> bool {
    !cell.is_empty() && cell.chars().all(|ch| ch.is_ascii_digit())
}
