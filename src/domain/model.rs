use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::utils::error::GatewayError;

/// 上傳文件中的一筆完整記錄
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub record_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub likes: String,
    pub transport: String,
    pub average_speed: BigDecimal,
    pub top_speed: BigDecimal,
}

/// 回傳給呼叫端的精簡記錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub name: String,
    pub transport: String,
    pub top_speed: BigDecimal,
}

impl OutputRecord {
    pub fn from_entry(entry: &InputRecord) -> Self {
        Self {
            name: entry.name.clone(),
            transport: entry.transport.clone(),
            top_speed: entry.top_speed.clone(),
        }
    }
}

impl From<InputRecord> for OutputRecord {
    fn from(entry: InputRecord) -> Self {
        Self {
            name: entry.name,
            transport: entry.transport,
            top_speed: entry.top_speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Allow,
    BlockCountry,
    BlockIsp,
    UnknownError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReputationVerdict {
    pub lookup_uri: Url,
    pub status: VerdictStatus,
    pub country_code: Option<String>,
    pub isp_name: Option<String>,
    /// 查詢失敗時對方回傳的訊息
    pub message: Option<String>,
}

/// 每個請求一筆，寫入後不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub request_uri: String,
    pub lookup_uri: Option<Url>,
    pub request_timestamp: DateTime<Utc>,
    pub response_status_code: u16,
    pub caller_ip: String,
    pub country_code: Option<String>,
    pub isp_name: Option<String>,
    pub elapsed_millis: u64,
}

#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_uri: String,
    pub caller_ip: String,
    pub body: String,
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub request_id: Uuid,
    pub status: StatusCode,
    pub result: Result<Vec<OutputRecord>, GatewayError>,
}
