//! CSV export of ledger data (the pro-tier data_export feature)

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::ExportRow;

impl Database {
    /// Render a user's full transaction history as CSV
    pub fn export_transactions_csv(&self, user_id: i64) -> Result<String> {
        let rows = self.export_rows(user_id)?;
        rows_to_csv(&rows)
    }
}

/// Serialize export rows to a CSV document with a header row
pub fn rows_to_csv(rows: &[ExportRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| Error::validation(format!("CSV serialization failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::validation(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::validation(format!("CSV output was not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;
    use chrono::NaiveDate;

    #[test]
    fn test_rows_to_csv_header_and_rows() {
        let rows = vec![ExportRow {
            report: "income_report".to_string(),
            id: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            kind: EntryKind::Income,
            amount_cents: 123_450,
            category: Some("Salary".to_string()),
            description: "March salary".to_string(),
            balance_cents: 123_450,
        }];

        let csv = rows_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "report,id,date,kind,amount,category,description,balance"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("income_report"));
        assert!(row.contains("1234.5"));
        assert!(row.contains("March salary"));
    }

    #[test]
    fn test_empty_export_is_empty() {
        // csv::Writer only emits headers once a record is written
        let csv = rows_to_csv(&[]).unwrap();
        assert!(csv.is_empty());
    }
}
