use crate::api::ApiState;
use crate::api::client_ip::ClientIp;
use crate::api::error::bootstrap_failure;
use crate::domain::{DeviceId, ProvisioningStatus};
use crate::provisioning::{DeviceStatus, ProvisioningError};
use crate::registry::StatusReport;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

const SHELL_SCRIPT: &str = "text/x-shellscript; charset=utf-8";

#[derive(Deserialize)]
pub struct RegisterRequest {
    serial: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    device_id: DeviceId,
    status: ProvisioningStatus,
}

pub async fn register(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ProvisioningError> {
    let Json(request) = payload?;
    let serial = request
        .serial
        .ok_or_else(|| ProvisioningError::Validation("'serial' is required".to_string()))?;

    let registration = state.orchestrator.register(&serial).await?;
    let status = if registration.created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((
        status,
        Json(RegisterResponse {
            device_id: registration.device_id,
            status: registration.status,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ProvisionQuery {
    device_hash: Option<String>,
}

pub async fn provision(
    State(state): State<Arc<ApiState>>,
    ClientIp(ip): ClientIp,
    Query(query): Query<ProvisionQuery>,
) -> Result<Response, ProvisioningError> {
    let device_hash = query.device_hash.unwrap_or_default();
    let script = state.orchestrator.fetch_provisioning_script(&device_hash, &ip).await?;

    Ok((
        [
            (header::CONTENT_TYPE, SHELL_SCRIPT.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", script.filename)),
        ],
        script.body,
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct BootstrapQuery {
    tag: Option<String>,
}

pub async fn bootstrap(State(state): State<Arc<ApiState>>, Query(query): Query<BootstrapQuery>) -> Response {
    match state.bootstrap.fetch(query.tag.as_deref()).await {
        Ok(script) => (
            [
                (header::CONTENT_TYPE, SHELL_SCRIPT.to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", script.filename())),
            ],
            script.content,
        )
            .into_response(),
        Err(e) => bootstrap_failure(query.tag.as_deref().unwrap_or_default(), e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusRequest {
    device_id: Option<String>,
}

#[derive(Serialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    script_url: Option<String>,
}

pub async fn check_status(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CheckStatusRequest>, JsonRejection>,
) -> Result<Json<CheckStatusResponse>, ProvisioningError> {
    let Json(request) = payload?;
    let id = DeviceId::from(request.device_id.unwrap_or_default());

    let response = match state.orchestrator.check_status(&id).await? {
        DeviceStatus::Approved { script_url } => CheckStatusResponse {
            status: "approved".to_string(),
            script_url: Some(script_url),
        },
        DeviceStatus::Waiting(status) => CheckStatusResponse {
            status: status.to_string(),
            script_url: None,
        },
    };

    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    device_id: Option<String>,
    provisioning_status: Option<String>,
    provisioning_instance_uuid: Option<Uuid>,
    state: Option<Map<String, Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    message: &'static str,
    device_id: DeviceId,
    status: ProvisioningStatus,
}

pub async fn report_status(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ProvisioningError> {
    let Json(request) = payload?;
    let id = DeviceId::from(request.device_id.unwrap_or_default());
    let report = StatusReport {
        provisioning_status: request.provisioning_status,
        instance_uuid: request.provisioning_instance_uuid,
        state: request.state,
    };

    let record = state.orchestrator.report_status(&id, report).await?;

    Ok(Json(StatusResponse {
        message: "Device status updated successfully.",
        device_id: record.id.clone(),
        status: record.status(),
    }))
}

#[derive(Deserialize)]
pub struct ApprovalRequest {
    approved: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    device_id: DeviceId,
    approved_for_provisioning: bool,
    status: ProvisioningStatus,
}

pub async fn set_approval(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, ProvisioningError> {
    let Json(request) = payload?;
    let record = state.orchestrator.set_approval(&DeviceId::from(id), request.approved).await?;

    Ok(Json(ApprovalResponse {
        device_id: record.id.clone(),
        approved_for_provisioning: record.approved_for_provisioning,
        status: record.status(),
    }))
}

pub async fn healthz() -> &'static str {
    "ok"
}
