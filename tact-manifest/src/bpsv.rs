//! Reader for BPSV (pipe-separated values) descriptor documents.
//!
//! `.build.info` and `versions` both use this layout: a header line of
//! `Name!TYPE:length` field declarations, an optional `## seqn = N` line,
//! and one pipe-separated data row per build.
//!
//! ```text
//! Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4
//! ## seqn = 12345
//! us|e2b...|61491
//! ```

use crate::{Error, Result};
use tracing::warn;

/// A single field declaration from the header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvField {
    pub name: String,
    /// Raw type specification (`STRING:0`, `HEX:16`, `DEC:4`). The reader
    /// does not interpret it; the wire values are strings either way.
    pub type_spec: String,
}

/// A parsed BPSV document.
#[derive(Debug, Clone)]
pub struct BpsvDocument {
    fields: Vec<BpsvField>,
    rows: Vec<Vec<String>>,
    sequence_number: Option<u32>,
}

impl BpsvDocument {
    /// Parse a BPSV document from text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();

        let header = lines.next().ok_or(Error::DescriptorSyntax)?;
        if !header.contains('!') {
            return Err(Error::DescriptorSyntax);
        }

        let mut fields = Vec::new();
        for decl in header.split('|') {
            let (name, type_spec) = decl.split_once('!').ok_or(Error::DescriptorSyntax)?;
            fields.push(BpsvField {
                name: name.trim().to_string(),
                type_spec: type_spec.trim().to_string(),
            });
        }

        let mut rows = Vec::new();
        let mut sequence_number = None;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // "## seqn = 12345", with flexible spacing
            if let Some(rest) = line.strip_prefix("##") {
                let rest = rest.trim();
                if let Some(value) = rest.strip_prefix("seqn") {
                    let value = value.trim().trim_start_matches('=').trim();
                    sequence_number = value.parse().ok();
                } else {
                    warn!("Ignoring unknown descriptor directive: {line:?}");
                }
                continue;
            }

            let values: Vec<String> = line.split('|').map(|v| v.trim().to_string()).collect();
            if values.len() != fields.len() {
                return Err(Error::DescriptorSyntax);
            }
            rows.push(values);
        }

        Ok(BpsvDocument {
            fields,
            rows,
            sequence_number,
        })
    }

    pub fn fields(&self) -> &[BpsvField] {
        &self.fields
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    /// Index of a field by case-insensitive name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Value of the named field in the given row.
    pub fn value<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.field_index(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let data = "Region!STRING:0|BuildId!DEC:4\n## seqn = 12345\nus|1234\neu|5678";
        let doc = BpsvDocument::parse(data).unwrap();

        assert_eq!(doc.sequence_number(), Some(12345));
        assert_eq!(doc.rows().len(), 2);
        assert_eq!(doc.fields().len(), 2);
        assert_eq!(doc.value(&doc.rows()[0], "region"), Some("us"));
        assert_eq!(doc.value(&doc.rows()[1], "BuildId"), Some("5678"));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            BpsvDocument::parse("us|1234"),
            Err(Error::DescriptorSyntax)
        ));
        assert!(matches!(BpsvDocument::parse(""), Err(Error::DescriptorSyntax)));
    }

    #[test]
    fn test_row_width_mismatch() {
        let data = "A!STRING:0|B!DEC:4\nonly-one-value";
        assert!(matches!(
            BpsvDocument::parse(data),
            Err(Error::DescriptorSyntax)
        ));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let data = "A!STRING:0\n\nx\n\ny\n";
        let doc = BpsvDocument::parse(data).unwrap();
        assert_eq!(doc.rows().len(), 2);
        assert_eq!(doc.sequence_number(), None);
    }
}
