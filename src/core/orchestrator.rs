use crate::config::toml_config::GatewayConfig;
use crate::config::ConfigHandle;
use crate::core::audit::AuditRecorder;
use crate::core::parser::RecordParser;
use crate::domain::model::{
    AuditRecord, ConversionOutcome, InboundRequest, OutputRecord, ReputationVerdict,
    VerdictStatus,
};
use crate::domain::ports::{AuditStore, ReputationCheck};
use crate::utils::error::{BlockReason, GatewayError, Result};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use uuid::Uuid;

/// 協調信譽檢查、解析與審計。
///
/// 流程：`START → (REPUTATION_CHECK)? → PARSE → RESPOND → AUDIT → DONE`。
/// 封鎖、查詢失敗與解析拒絕都會提早跳到 AUDIT；AUDIT 在任何路徑上都只執行一次。
pub struct RequestOrchestrator<R: ReputationCheck, S: AuditStore> {
    config: ConfigHandle,
    reputation: R,
    recorder: AuditRecorder<S>,
}

impl<R: ReputationCheck, S: AuditStore> RequestOrchestrator<R, S> {
    pub fn new(config: ConfigHandle, reputation: R, store: S) -> Self {
        Self {
            config,
            reputation,
            recorder: AuditRecorder::new(store),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn recorder(&self) -> &AuditRecorder<S> {
        &self.recorder
    }

    pub async fn handle(&self, request: InboundRequest) -> ConversionOutcome {
        let request_id = Uuid::new_v4();
        let requested_at = Utc::now();
        let started = Instant::now();
        let settings = self.config.snapshot();

        let mut verdict: Option<ReputationVerdict> = None;
        let result = AssertUnwindSafe(self.process(&request, &settings, &mut verdict))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(GatewayError::InternalFailure {
                    message: panic_message(panic.as_ref()),
                })
            });

        let status = match &result {
            Ok(_) => StatusCode::OK,
            Err(e) => e.status_code(),
        };

        let entry = build_audit_record(AuditContext {
            request_id,
            request: &request,
            requested_at,
            status,
            verdict: verdict.as_ref(),
            error: result.as_ref().err(),
            elapsed_millis: started.elapsed().as_millis() as u64,
        });
        let elapsed_millis = entry.elapsed_millis;

        if let Err(e) = self.recorder.record(entry).await {
            tracing::error!(
                request_id = %request_id,
                "Failed to persist audit record: {} ({})",
                e,
                e.recovery_suggestion()
            );
        }

        match &result {
            Err(e) if status.is_server_error() => tracing::error!(
                request_id = %request_id,
                caller_ip = %request.caller_ip,
                "Request failed with {}: {}",
                status.as_u16(),
                e
            ),
            _ => tracing::info!(
                request_id = %request_id,
                caller_ip = %request.caller_ip,
                status = status.as_u16(),
                elapsed_ms = elapsed_millis,
                "Request processed"
            ),
        }

        ConversionOutcome {
            request_id,
            status,
            result,
        }
    }

    async fn process(
        &self,
        request: &InboundRequest,
        settings: &GatewayConfig,
        verdict: &mut Option<ReputationVerdict>,
    ) -> Result<Vec<OutputRecord>> {
        if settings.web.ip_validation_enabled {
            let checked = self
                .reputation
                .check(&request.caller_ip, &settings.validation)
                .await?;
            let outcome = verdict_to_result(&checked);
            *verdict = Some(checked);

            if let Err(e) = outcome {
                if let GatewayError::PolicyBlocked(reason) = &e {
                    tracing::warn!("Blocking request from {} based on {}", request.caller_ip, reason);
                }
                return Err(e);
            }
        } else {
            tracing::debug!("IP validation disabled, skipping reputation check");
        }

        let parser = RecordParser::from_config(&settings.web);
        let records = parser.convert(&request.body)?;
        tracing::debug!("Converted {} record(s)", records.len());
        Ok(records)
    }
}

fn verdict_to_result(verdict: &ReputationVerdict) -> Result<()> {
    match verdict.status {
        VerdictStatus::Allow => Ok(()),
        VerdictStatus::BlockCountry => Err(GatewayError::PolicyBlocked(BlockReason::Country(
            verdict.country_code.clone().unwrap_or_default(),
        ))),
        VerdictStatus::BlockIsp => Err(GatewayError::PolicyBlocked(BlockReason::Isp(
            verdict.isp_name.clone().unwrap_or_default(),
        ))),
        VerdictStatus::UnknownError => Err(GatewayError::ReputationLookupFailed {
            lookup_uri: Some(verdict.lookup_uri.clone()),
            reason: format!(
                "lookup reported failure: {}",
                verdict.message.as_deref().unwrap_or("no message")
            ),
        }),
    }
}

struct AuditContext<'a> {
    request_id: Uuid,
    request: &'a InboundRequest,
    requested_at: DateTime<Utc>,
    status: StatusCode,
    verdict: Option<&'a ReputationVerdict>,
    error: Option<&'a GatewayError>,
    elapsed_millis: u64,
}

fn build_audit_record(ctx: AuditContext<'_>) -> AuditRecord {
    // 查詢失敗時沒有 verdict，但 URI 仍記在錯誤裡
    let lookup_uri = match (ctx.verdict, ctx.error) {
        (Some(verdict), _) => Some(verdict.lookup_uri.clone()),
        (None, Some(GatewayError::ReputationLookupFailed { lookup_uri, .. })) => lookup_uri.clone(),
        _ => None,
    };

    AuditRecord {
        request_id: ctx.request_id,
        request_uri: ctx.request.request_uri.clone(),
        lookup_uri,
        request_timestamp: ctx.requested_at,
        response_status_code: ctx.status.as_u16(),
        caller_ip: ctx.request.caller_ip.clone(),
        country_code: ctx.verdict.and_then(|v| v.country_code.clone()),
        isp_name: ctx.verdict.and_then(|v| v.isp_name.clone()),
        elapsed_millis: ctx.elapsed_millis,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic during processing: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic during processing: {}", message)
    } else {
        "panic during processing".to_string()
    }
}
