//! Minimal CSV codec for the checkpoint file
//!
//! Fields are quoted only when they contain a delimiter, quote or line
//! break. The parser accepts quoted fields spanning lines and a leading BOM.

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Encodes one row, newline-terminated
pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER);
        }
        push_field(&mut line, field.as_ref());
    }
    line.push('\n');
    line
}

fn push_field(out: &mut String, field: &str) {
    let needs_quotes = field
        .chars()
        .any(|c| c == DELIMITER || c == QUOTE || c == '\n' || c == '\r');
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            out.push(QUOTE);
        }
        out.push(c);
    }
    out.push(QUOTE);
}

/// Parses CSV content into rows of fields; blank lines are skipped
pub fn parse(content: &str) -> Result<Vec<Vec<String>>, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            QUOTE if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            DELIMITER => {
                row.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' => {}
            '\n' => {
                line += 1;
                finish_row(&mut rows, &mut row, &mut field);
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(format!("unterminated quoted field near line {}", line));
    }
    finish_row(&mut rows, &mut row, &mut field);
    Ok(rows)
}

fn finish_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    row.push(std::mem::take(field));
    let row = std::mem::take(row);
    if row.len() == 1 && row[0].is_empty() {
        return;
    }
    rows.push(row);
}
