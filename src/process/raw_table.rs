use crate::process::parse::RawRecord;

/// Parsed walker records laid out as rows × columns.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Union of all field names, in the order each was first seen.
    pub headers: Vec<String>,
    /// One entry per record, aligned with `headers`. The row's position is its index.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Assemble records into a table. Fields a record lacks become `None`.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for rec in records {
            for key in rec.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|rec| {
                headers
                    .iter()
                    .map(|h| rec.get(h).map(str::to_string))
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `row` for column `col`; `None` for missing columns or null cells.
    pub fn get(&self, row: usize, col: Option<usize>) -> Option<&str> {
        self.rows.get(row)?.get(col?)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
