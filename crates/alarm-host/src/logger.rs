//! Durable per-installation event record (§6.3): a CSV file, opened and
//! closed on every single append rather than held open for the process
//! lifetime, so a concurrent `tail`/rotate/backup never races a live write.

use chrono::TimeZone;
use tokio::io::AsyncWriteExt;

use crate::interfaces::{LogRecord, Logger, LoggerError};

#[derive(Debug, Clone)]
pub struct CsvLogger {
    path: std::path::PathBuf,
}

impl CsvLogger {
    pub fn new(path: impl Into<std::path::PathBuf>) -> CsvLogger {
        CsvLogger { path: path.into() }
    }
}

impl Logger for CsvLogger {
    async fn log_event(&self, record: &LogRecord) -> Result<(), LoggerError> {
        let line = format_row(record);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LoggerError::Io(format!("opening '{}': {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LoggerError::Io(format!("writing '{}': {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| LoggerError::Io(format!("flushing '{}': {e}", self.path.display())))?;
        Ok(())
    }
}

fn format_row(record: &LogRecord) -> String {
    let mmss = match record.mmss {
        Some((m, s)) => format!("{m:02}{s:02}"),
        None => String::new(),
    };
    // 0 if inferred or PING, per spec §6.3.
    let seq = record.seq.unwrap_or(0);
    let timestamp = chrono::Local
        .timestamp_opt(record.timestamp_secs as i64, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    format!(
        "{},{},{},{},{},{},{}\n",
        timestamp,
        csv_escape(&record.client_id),
        seq,
        mmss,
        record.event.name(),
        csv_escape(&record.sensor_id),
        csv_escape(&record.extra),
    )
}

/// Event fields are restricted to the telenumeric/decimal alphabet in
/// practice, but escape defensively since handler-supplied `extra` text is
/// not constrained by the codec itself.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_protocol::EventKind;

    #[tokio::test]
    async fn appends_one_row_per_call_and_reopens_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let logger = CsvLogger::new(&path);

        logger
            .log_event(&LogRecord {
                timestamp_secs: 100,
                client_id: "A01".into(),
                seq: Some(1),
                mmss: Some((1, 40)),
                event: EventKind::Okay,
                sensor_id: String::new(),
                extra: String::new(),
            })
            .await
            .unwrap();
        logger
            .log_event(&LogRecord {
                timestamp_secs: 101,
                client_id: "A01".into(),
                seq: Some(2),
                mmss: None,
                event: EventKind::SensorTriggered,
                sensor_id: "S1".into(),
                extra: "160".into(),
            })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let row0: Vec<&str> = lines[0].splitn(7, ',').collect();
        assert!(chrono::DateTime::parse_from_rfc3339(row0[0]).is_ok());
        assert_eq!(&row0[1..], ["A01", "1", "0140", "OKAY", "", ""]);

        let row1: Vec<&str> = lines[1].splitn(7, ',').collect();
        assert!(chrono::DateTime::parse_from_rfc3339(row1[0]).is_ok());
        assert_eq!(&row1[1..], ["A01", "2", "", "SENSOR_TRIGGERED", "S1", "160"]);
    }

    #[tokio::test]
    async fn inferred_and_ping_events_log_seq_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let logger = CsvLogger::new(&path);

        logger
            .log_event(&LogRecord {
                timestamp_secs: 100,
                client_id: "A01".into(),
                seq: None,
                mmss: None,
                event: EventKind::Breach,
                sensor_id: String::new(),
                extra: String::new(),
            })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let row: Vec<&str> = contents.lines().next().unwrap().splitn(7, ',').collect();
        assert_eq!(&row[1..], ["A01", "0", "", "BREACH", "", ""]);
    }

    #[test]
    fn csv_escape_quotes_fields_with_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("has\"quote"), "\"has\"\"quote\"");
    }
}
