use crate::config::toml_config::ValidationConfig;
use crate::domain::model::{ReputationVerdict, VerdictStatus};
use crate::domain::ports::ReputationCheck;
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// 地理位置查詢服務的回應，未知欄位一律忽略
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpApiResponse {
    /// 查詢欄位未包含 `status` 時對方不會回傳
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
}

impl IpApiResponse {
    pub fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("fail")
    }

    /// 內網位址查不到資料是預期中的
    pub fn is_private_address(&self) -> bool {
        self.message
            .as_deref()
            .map(|message| message.contains("private"))
            .unwrap_or(false)
    }
}

/// 封鎖名單優先於查詢失敗：被封鎖的 IP 即使查詢失敗也回報為封鎖
pub fn derive_status(
    response: &IpApiResponse,
    blocked_countries: &HashSet<String>,
    blocked_providers: &[String],
) -> VerdictStatus {
    if let Some(country) = &response.country_code {
        if blocked_countries.contains(country) {
            return VerdictStatus::BlockCountry;
        }
    }

    if let Some(isp) = &response.isp {
        if blocked_providers
            .iter()
            .any(|provider| isp.contains(provider.as_str()))
        {
            return VerdictStatus::BlockIsp;
        }
    }

    if response.is_failure() && !response.is_private_address() {
        return VerdictStatus::UnknownError;
    }

    VerdictStatus::Allow
}

#[derive(Debug, Clone)]
pub struct ReputationChecker {
    client: Client,
}

impl Default for ReputationChecker {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl ReputationChecker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// `{request_url}/{ip}?{fields}`
    pub fn lookup_url(ip_address: &str, policy: &ValidationConfig) -> Result<Url> {
        let raw = format!(
            "{}/{}?{}",
            policy.request_url.trim_end_matches('/'),
            ip_address,
            policy.request_fields.join(",")
        );

        Url::parse(&raw).map_err(|e| GatewayError::ReputationLookupFailed {
            lookup_uri: None,
            reason: format!("Invalid lookup URL '{}': {}", raw, e),
        })
    }
}

#[async_trait]
impl ReputationCheck for ReputationChecker {
    async fn check(
        &self,
        ip_address: &str,
        policy: &ValidationConfig,
    ) -> Result<ReputationVerdict> {
        let lookup_uri = Self::lookup_url(ip_address, policy)?;
        let lookup_failed = |reason: String| GatewayError::ReputationLookupFailed {
            lookup_uri: Some(lookup_uri.clone()),
            reason,
        };

        tracing::debug!("Looking up reputation for {} via {}", ip_address, lookup_uri);

        let response = self
            .client
            .get(lookup_uri.clone())
            .timeout(Duration::from_millis(policy.timeout_ms))
            .send()
            .await
            .map_err(|e| lookup_failed(format!("request failed: {}", e)))?;

        tracing::debug!("Lookup response status: {}", response.status());

        let response = response
            .error_for_status()
            .map_err(|e| lookup_failed(format!("unexpected status: {}", e)))?;

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| lookup_failed(format!("undecodable response: {}", e)))?;

        let status = derive_status(&body, &policy.blocked_countries, &policy.blocked_providers);

        Ok(ReputationVerdict {
            lookup_uri,
            status,
            country_code: body.country_code,
            isp_name: body.isp,
            message: body.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn policy(base_url: String) -> ValidationConfig {
        ValidationConfig {
            request_url: base_url,
            request_fields: vec![
                "status".to_string(),
                "message".to_string(),
                "countryCode".to_string(),
                "isp".to_string(),
            ],
            blocked_countries: ["CN".to_string()].into_iter().collect(),
            blocked_providers: vec!["SomeISP".to_string()],
            timeout_ms: 2000,
        }
    }

    fn response(status: &str, country: Option<&str>, isp: Option<&str>) -> IpApiResponse {
        IpApiResponse {
            status: Some(status.to_string()),
            message: None,
            country_code: country.map(str::to_string),
            isp: isp.map(str::to_string),
        }
    }

    #[test]
    fn test_lookup_url_format() {
        let url = ReputationChecker::lookup_url(
            "8.8.8.8",
            &policy("http://ip-api.com/json/".to_string()),
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "http://ip-api.com/json/8.8.8.8?status,message,countryCode,isp"
        );
    }

    #[test]
    fn test_country_block_wins_over_isp() {
        let p = policy("http://unused".to_string());
        let r = response("success", Some("CN"), Some("SomeISP"));

        assert_eq!(
            derive_status(&r, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::BlockCountry
        );
    }

    #[test]
    fn test_isp_substring_is_case_sensitive() {
        let p = policy("http://unused".to_string());

        let matching = response("success", Some("GB"), Some("SomeISP Holdings Ltd"));
        assert_eq!(
            derive_status(&matching, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::BlockIsp
        );

        let other_case = response("success", Some("GB"), Some("someisp holdings"));
        assert_eq!(
            derive_status(&other_case, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::Allow
        );
    }

    #[test]
    fn test_block_wins_over_failed_lookup() {
        let p = policy("http://unused".to_string());
        let r = response("fail", Some("CN"), None);

        assert_eq!(
            derive_status(&r, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::BlockCountry
        );
    }

    #[test]
    fn test_failure_messages() {
        let p = policy("http://unused".to_string());

        let mut private = response("fail", None, None);
        private.message = Some("private range".to_string());
        assert_eq!(
            derive_status(&private, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::Allow
        );

        let mut invalid = response("fail", None, None);
        invalid.message = Some("invalid query".to_string());
        assert_eq!(
            derive_status(&invalid, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::UnknownError
        );

        let no_message = response("fail", None, None);
        assert_eq!(
            derive_status(&no_message, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::UnknownError
        );
    }

    #[tokio::test]
    async fn test_check_allows_clean_ip() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/json/8.8.8.8");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(serde_json::json!({
                        "status": "success",
                        "countryCode": "US",
                        "isp": "Google LLC",
                        "query": "8.8.8.8"
                    }));
            })
            .await;

        let checker = ReputationChecker::default();
        let verdict = checker
            .check("8.8.8.8", &policy(server.url("/json")))
            .await
            .unwrap();

        api_mock.assert_async().await;
        assert_eq!(verdict.status, VerdictStatus::Allow);
        assert_eq!(verdict.country_code.as_deref(), Some("US"));
        assert_eq!(verdict.isp_name.as_deref(), Some("Google LLC"));
        assert!(verdict.lookup_uri.as_str().ends_with("/json/8.8.8.8?status,message,countryCode,isp"));
    }

    #[tokio::test]
    async fn test_check_blocks_country_and_isp() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/json/1.2.3.4");
                then.status(200).json_body(serde_json::json!({
                    "status": "success",
                    "countryCode": "CN",
                    "isp": "SomeISP"
                }));
            })
            .await;

        let verdict = ReputationChecker::default()
            .check("1.2.3.4", &policy(server.url("/json")))
            .await
            .unwrap();

        api_mock.assert_async().await;
        assert_eq!(verdict.status, VerdictStatus::BlockCountry);
    }

    #[tokio::test]
    async fn test_check_blocks_country_without_status_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json/1.2.3.4");
                then.status(200).json_body(serde_json::json!({
                    "countryCode": "CN",
                    "isp": "SomeISP"
                }));
            })
            .await;

        let mut p = policy(server.url("/json"));
        p.request_fields = vec!["countryCode".to_string(), "isp".to_string()];

        let verdict = ReputationChecker::default()
            .check("1.2.3.4", &p)
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::BlockCountry);
        assert_eq!(verdict.country_code.as_deref(), Some("CN"));
    }

    #[test]
    fn test_missing_status_is_not_a_failure() {
        let p = policy("http://unused".to_string());
        let mut r = response("success", Some("GB"), Some("BT"));
        r.status = None;

        assert!(!r.is_failure());
        assert_eq!(
            derive_status(&r, &p.blocked_countries, &p.blocked_providers),
            VerdictStatus::Allow
        );
    }

    #[tokio::test]
    async fn test_check_private_address_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json/127.0.0.1");
                then.status(200).json_body(serde_json::json!({
                    "status": "fail",
                    "message": "private range"
                }));
            })
            .await;

        let verdict = ReputationChecker::default()
            .check("127.0.0.1", &policy(server.url("/json")))
            .await
            .unwrap();

        assert_eq!(verdict.status, VerdictStatus::Allow);
        assert_eq!(verdict.country_code, None);
        assert_eq!(verdict.message.as_deref(), Some("private range"));
    }

    #[tokio::test]
    async fn test_check_server_error_is_lookup_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json/8.8.4.4");
                then.status(503);
            })
            .await;

        let err = ReputationChecker::default()
            .check("8.8.4.4", &policy(server.url("/json")))
            .await
            .unwrap_err();

        match err {
            GatewayError::ReputationLookupFailed { lookup_uri, .. } => assert!(lookup_uri.is_some()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_malformed_body_is_lookup_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json/8.8.4.4");
                then.status(200)
                    .header("Content-Type", "application/json")
                    .body("<html>rate limited</html>");
            })
            .await;

        let err = ReputationChecker::default()
            .check("8.8.4.4", &policy(server.url("/json")))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_check_timeout_is_lookup_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/json/9.9.9.9");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(serde_json::json!({"status": "success"}));
            })
            .await;

        let mut p = policy(server.url("/json"));
        p.timeout_ms = 50;

        let err = ReputationChecker::default()
            .check("9.9.9.9", &p)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ReputationLookupFailed { .. }));
    }
}
