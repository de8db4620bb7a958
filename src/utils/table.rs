use super::html::escape_html;

/// A simple table rendered either as aligned plain text (for the terminal)
/// or as an HTML `<table>` (for the dashboard)
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl Table {
    /// Create a new table with the given headers
    pub fn new(headers: Vec<&str>) -> Self {
        let col_widths = headers.iter().map(|h| h.chars().count()).collect();
        let headers = headers.iter().map(|h| h.to_string()).collect();
        Table {
            headers,
            rows: Vec::new(),
            col_widths,
        }
    }

    /// Add a row to the table
    pub fn add_row(&mut self, row: Vec<String>) {
        // Update column widths if needed
        for (i, col) in row.iter().enumerate() {
            if i < self.col_widths.len() {
                self.col_widths[i] = self.col_widths[i].max(col.chars().count());
            }
        }

        self.rows.push(row);
    }

    /// Render the table as aligned text
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.render_row(&self.headers));
        output.push('\n');

        output.push_str(&self.render_separator());
        output.push('\n');

        for row in &self.rows {
            output.push_str(&self.render_row(row));
            output.push('\n');
        }

        output
    }

    /// Render the table as an HTML fragment; every cell is escaped
    pub fn render_html(&self) -> String {
        let mut output = String::from("<table class=\"latest\">\n<thead><tr>");
        for header in &self.headers {
            output.push_str(&format!("<th>{}</th>", escape_html(header)));
        }
        output.push_str("</tr></thead>\n<tbody>\n");

        for row in &self.rows {
            output.push_str("<tr>");
            for col in row.iter().take(self.headers.len()) {
                output.push_str(&format!("<td>{}</td>", escape_html(col)));
            }
            output.push_str("</tr>\n");
        }

        output.push_str("</tbody>\n</table>");
        output
    }

    /// Render a single row with proper spacing
    fn render_row(&self, row: &[String]) -> String {
        let mut line = String::new();
        for (i, col) in row.iter().enumerate() {
            if i < self.col_widths.len() {
                let width = self.col_widths[i];
                line.push_str(&format!("{:<width$}", col, width = width));
                if i < row.len() - 1 {
                    line.push_str(" | ");
                }
            }
        }
        line.trim_end().to_string()
    }

    /// Render a separator line
    fn render_separator(&self) -> String {
        let mut line = String::new();
        for (i, &width) in self.col_widths.iter().enumerate() {
            line.push_str(&"-".repeat(width));
            if i < self.col_widths.len() - 1 {
                line.push_str("-+-");
            }
        }
        line
    }
}
