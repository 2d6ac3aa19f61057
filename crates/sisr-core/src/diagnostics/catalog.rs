use std::collections::HashMap;

use crate::error::{Result, SisrError};

/// A source catalog in SExtractor's ASCII_HEAD layout: `#`-prefixed lines
/// naming each column by its 1-based position, then one row per source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<f64>>,
}

impl Catalog {
    pub fn parse(text: &str) -> Result<Self> {
        let mut columns = HashMap::new();
        let mut rows = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('#') {
                let mut parts = header.split_whitespace();
                let (Some(index), Some(name)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let index: usize = index.parse().map_err(|_| {
                    SisrError::Subprocess(format!(
                        "bad catalog header on line {}: {line}",
                        lineno + 1
                    ))
                })?;
                if index == 0 {
                    return Err(SisrError::Subprocess(format!(
                        "catalog column index 0 on line {}",
                        lineno + 1
                    )));
                }
                columns.insert(name.to_string(), index - 1);
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|v| v.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    SisrError::Subprocess(format!("bad catalog row {}: {e}", lineno + 1))
                })?;
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of a named column, or `None` when the catalog lacks it.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = *self.columns.get(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index).copied()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#   1 NUMBER                 Running object number
#   2 FLUX_RADIUS            Fraction-of-light radii                                    [pixel]
#   3 FWHM_IMAGE             FWHM assuming a gaussian core                              [pixel]
         1    2.125     3.50
         2    1.875     2.90
         3    2.500     4.10
";

    #[test]
    fn test_parse_ascii_head() {
        let catalog = Catalog::parse(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.column("FWHM_IMAGE").unwrap(), vec![3.5, 2.9, 4.1]);
        assert_eq!(catalog.column("FLUX_RADIUS").unwrap()[1], 1.875);
        assert!(catalog.column("ELLIPTICITY").is_none());
    }

    #[test]
    fn test_header_only_catalog_is_empty() {
        let catalog = Catalog::parse("#   1 NUMBER  Running object number\n").unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.has_column("NUMBER"));
    }
}
