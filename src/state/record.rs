//! Row definitions for the harvested dataset
//!
//! Every row of the remote table becomes a [`Record`] with exactly eight
//! text fields in the fixed [`HEADER`] order.
use std::fmt;

/// Column names of the checkpoint file, in field order
pub const HEADER: [&str; 8] = [
    "Product Name",
    "Active Ingredient",
    "Dosage Form",
    "Product Category",
    "NAFDAC Reg No",
    "Applicant",
    "Manufacturer",
    "Approval Date",
];

/// Number of fields in a record
pub const FIELD_COUNT: usize = HEADER.len();

/// Position of the registration number, the de-facto unique identifier
pub const IDENTIFIER_COLUMN: usize = 4;

/// One normalized row of the dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    fields: [String; FIELD_COUNT],
}

impl Record {
    /// Builds a record from cell texts in column order
    ///
    /// Missing trailing cells become empty fields. Cells beyond the header
    /// width are dropped. Cell text is not normalized here; extractors call
    /// [`normalize_text`] before handing cells over.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = cells.into_iter();
        let fields = std::array::from_fn(|_| iter.next().map(Into::into).unwrap_or_default());
        Self { fields }
    }

    /// All fields in header order
    pub fn fields(&self) -> &[String; FIELD_COUNT] {
        &self.fields
    }

    /// A single field by column index
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn product_name(&self) -> &str {
        &self.fields[0]
    }

    pub fn registration_number(&self) -> &str {
        &self.fields[IDENTIFIER_COLUMN]
    }

    /// Returns the trimmed identifier, or None when it is blank
    pub fn identifier(&self) -> Option<&str> {
        let id = self.fields[IDENTIFIER_COLUMN].trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// True if every field is empty
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.product_name(),
            self.identifier().unwrap_or("-")
        )
    }
}

/// Trims a cell and collapses internal whitespace runs to a single space
///
/// Rendered cells and JSON values differ mostly in line breaks and padding;
/// both extractors pass every cell through here so they agree exactly.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cells_pads_short_rows() {
        let record = Record::from_cells(vec!["Paracetamol", "Acetaminophen"]);
        assert_eq!(record.product_name(), "Paracetamol");
        assert_eq!(record.field(1), Some("Acetaminophen"));
        assert_eq!(record.field(7), Some(""));
        assert_eq!(record.identifier(), None);
    }

    #[test]
    fn test_from_cells_drops_extra_cells() {
        let cells: Vec<String> = (0..10).map(|i| format!("c{}", i)).collect();
        let record = Record::from_cells(cells);
        assert_eq!(record.fields().len(), FIELD_COUNT);
        assert_eq!(record.field(7), Some("c7"));
        assert_eq!(record.field(8), None);
    }

    #[test]
    fn test_identifier_is_trimmed() {
        let record = Record::from_cells(vec!["a", "b", "c", "d", "  A4-1234  ", "f", "g", "h"]);
        assert_eq!(record.identifier(), Some("A4-1234"));
        assert_eq!(record.registration_number(), "  A4-1234  ");
    }

    #[test]
    fn test_blank_identifier_is_none() {
        let record = Record::from_cells(vec!["a", "b", "c", "d", "   "]);
        assert_eq!(record.identifier(), None);
        assert!(!record.is_blank());
        assert!(Record::default().is_blank());
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Tablet\n   (Film coated) "), "Tablet (Film coated)");
        assert_eq!(normalize_text("\t\n"), "");
    }

    #[test]
    fn test_header_identifier_column() {
        assert_eq!(HEADER[IDENTIFIER_COLUMN], "NAFDAC Reg No");
    }
}
