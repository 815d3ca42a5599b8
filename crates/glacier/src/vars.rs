//! The `list` subcommand: overview of supported environment variables.

use tracing::info;

use glacier_secrets::VariableStatus;

/// Log the variable overview, one aligned row per variable.
pub fn list(all: bool) {
    let rows = glacier_secrets::list_variables(&glacier_secrets::env_map(), all);
    if rows.is_empty() {
        info!("no variables defined");
        return;
    }
    for line in render(&rows) {
        info!("{line}");
    }
}

/// Render the overview as aligned text columns.
fn render(rows: &[VariableStatus]) -> Vec<String> {
    let name_width = rows
        .iter()
        .map(|row| row.name.len())
        .chain(std::iter::once("VARIABLE".len()))
        .max()
        .unwrap_or(0);

    let mut lines = vec![format!("{:<name_width$}  {:<3}  {}", "VARIABLE", "SET", "DESCRIPTION")];
    for row in rows {
        let set = if row.set { "Yes" } else { "No" };
        lines.push(format!("{:<name_width$}  {set:<3}  {}", row.name, row.description));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_align_under_the_header() {
        let rows = vec![
            VariableStatus {
                name: "RESTIC_REPOSITORY",
                set: true,
                description: "Location of the repository",
            },
            VariableStatus {
                name: "TMPDIR",
                set: false,
                description: "Location for temporary files",
            },
        ];

        let lines = render(&rows);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("VARIABLE"));
        assert!(lines[1].contains("Yes"));
        assert!(lines[2].contains("No "));

        // description column starts at the same offset in every line
        let offset = lines[0].find("DESCRIPTION").unwrap();
        assert_eq!(lines[1].find("Location of the repository"), Some(offset));
        assert_eq!(lines[2].find("Location for temporary files"), Some(offset));
    }
}
