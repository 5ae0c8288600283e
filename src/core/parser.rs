use crate::config::toml_config::{WebConfig, DEFAULT_DELIMITER};
use crate::domain::model::{InputRecord, OutputRecord};
use crate::utils::error::{GatewayError, Result};
use bigdecimal::BigDecimal;
use csv::{ReaderBuilder, StringRecord};
use std::str::FromStr;
use uuid::Uuid;

/// 每列固定欄位：UUID, ID, Name, Likes, Transport, Avg Speed, Top Speed
pub const FIELD_COUNT: usize = 7;

#[derive(Debug, Clone, Copy)]
pub struct RecordParser {
    delimiter: u8,
    strict: bool,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER, true)
    }
}

impl RecordParser {
    pub fn new(delimiter: u8, strict: bool) -> Self {
        Self { delimiter, strict }
    }

    pub fn from_config(config: &WebConfig) -> Self {
        Self::new(config.delimiter(), config.data_validation_enabled)
    }

    /// 嚴格模式下遇到第一筆格式錯誤就整份拒絕；寬鬆模式則略過該列
    pub fn parse_entries(&self, document: &str) -> Result<Vec<InputRecord>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(document.as_bytes());

        let mut entries = Vec::new();
        let mut dropped = 0usize;

        for (index, row) in reader.records().enumerate() {
            let fallback_line = index as u64 + 1;
            let (line, parsed) = match row {
                Ok(record) => (
                    record.position().map(|p| p.line()).unwrap_or(fallback_line),
                    parse_record(&record),
                ),
                Err(e) => (
                    e.position().map(|p| p.line()).unwrap_or(fallback_line),
                    Err(e.to_string()),
                ),
            };

            match parsed {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    if self.strict {
                        tracing::debug!("Rejecting document, row {} is malformed: {}", line, reason);
                        return Err(GatewayError::MalformedInput { line, reason });
                    }
                    tracing::debug!("Dropping malformed row {}: {}", line, reason);
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::info!(
                "Dropped {} malformed row(s), kept {} entries",
                dropped,
                entries.len()
            );
        }

        Ok(entries)
    }

    pub fn convert(&self, document: &str) -> Result<Vec<OutputRecord>> {
        Ok(self
            .parse_entries(document)?
            .into_iter()
            .map(OutputRecord::from)
            .collect())
    }
}

fn parse_record(record: &StringRecord) -> std::result::Result<InputRecord, String> {
    if record.len() != FIELD_COUNT {
        return Err(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            record.len()
        ));
    }

    let record_id = Uuid::parse_str(&record[0])
        .map_err(|e| format!("invalid identifier '{}': {}", &record[0], e))?;
    let average_speed = parse_decimal("average speed", &record[5])?;
    let top_speed = parse_decimal("top speed", &record[6])?;

    Ok(InputRecord {
        record_id,
        external_id: record[1].to_string(),
        name: record[2].to_string(),
        likes: record[3].to_string(),
        transport: record[4].to_string(),
        average_speed,
        top_speed,
    })
}

fn parse_decimal(field: &str, value: &str) -> std::result::Result<BigDecimal, String> {
    BigDecimal::from_str(value).map_err(|e| format!("invalid {} '{}': {}", field, value, e))
}
