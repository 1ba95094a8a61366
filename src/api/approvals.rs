//! Approval workflow endpoints

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::ActingUser;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, OptionalJson};
use crate::domain::approval::{ApprovalStep, ApprovalStepDefinition, ApprovalWorkflow};
use crate::infrastructure::services::CreateApprovalRequest;

/// Step definition in a create request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStepApiRequest {
    pub step_name: String,
    #[serde(default)]
    pub assigned_role: Option<String>,
    #[serde(default)]
    pub assigned_user_id: Option<i64>,
    #[serde(default = "default_true")]
    pub is_required: bool,
}

fn default_true() -> bool {
    true
}

impl From<ApprovalStepApiRequest> for ApprovalStepDefinition {
    fn from(req: ApprovalStepApiRequest) -> Self {
        Self {
            step_name: req.step_name,
            assigned_role: req.assigned_role,
            assigned_user_id: req.assigned_user_id,
            is_required: req.is_required,
        }
    }
}

/// Body of `POST /approvals`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApprovalApiRequest {
    pub workflow_type: String,
    pub reference_type: String,
    pub reference_number: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub steps: Vec<ApprovalStepApiRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApprovalsQuery {
    pub workflow_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApprovalsQuery {
    /// Defaults to the acting user
    pub user_id: Option<i64>,
    pub role: Option<String>,
}

/// Body of approve and skip requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActionRequest {
    #[serde(default)]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectApprovalRequest {
    #[serde(default)]
    pub rejection_reason: String,
    #[serde(default)]
    pub step_number: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelApprovalRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStepResponse {
    pub step_number: u32,
    pub step_name: String,
    pub assigned_role: Option<String>,
    pub assigned_user_id: Option<i64>,
    pub is_required: bool,
    pub status: String,
    pub action_by: Option<i64>,
    pub action_at: Option<String>,
    pub comments: Option<String>,
}

impl From<&ApprovalStep> for ApprovalStepResponse {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            step_number: step.step_number,
            step_name: step.step_name.clone(),
            assigned_role: step.assigned_role.clone(),
            assigned_user_id: step.assigned_user_id,
            is_required: step.is_required,
            status: serde_json::to_value(step.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default(),
            action_by: step.action_by,
            action_at: step.action_at.map(|d| d.to_rfc3339()),
            comments: step.comments.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub id: String,
    pub workflow_type: String,
    pub reference_type: String,
    pub reference_number: String,
    pub requested_by: i64,
    pub status: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub steps: Vec<ApprovalStepResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub final_approved_by: Option<i64>,
    pub final_approved_at: Option<String>,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ApprovalWorkflow> for ApprovalResponse {
    fn from(workflow: &ApprovalWorkflow) -> Self {
        Self {
            id: workflow.id().to_string(),
            workflow_type: workflow.workflow_type().to_string(),
            reference_type: workflow.reference_type().to_string(),
            reference_number: workflow.reference_number().to_string(),
            requested_by: workflow.requested_by(),
            status: workflow.status().to_string(),
            current_step: workflow.current_step(),
            total_steps: workflow.total_steps(),
            steps: workflow.steps().iter().map(ApprovalStepResponse::from).collect(),
            remarks: workflow.remarks().map(String::from),
            final_approved_by: workflow.final_approved_by(),
            final_approved_at: workflow.final_approved_at().map(|d| d.to_rfc3339()),
            rejected_by: workflow.rejected_by(),
            rejected_at: workflow.rejected_at().map(|d| d.to_rfc3339()),
            rejection_reason: workflow.rejection_reason().map(String::from),
            created_at: workflow.created_at().to_rfc3339(),
            updated_at: workflow.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListApprovalsResponse {
    pub approvals: Vec<ApprovalResponse>,
    pub total: usize,
}

impl ListApprovalsResponse {
    fn from_workflows(workflows: &[ApprovalWorkflow]) -> Self {
        let approvals: Vec<ApprovalResponse> =
            workflows.iter().map(ApprovalResponse::from).collect();
        let total = approvals.len();

        Self { approvals, total }
    }
}

/// GET /approvals
pub async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ListApprovalsQuery>,
) -> Result<Json<ListApprovalsResponse>, ApiError> {
    let workflows = state.approval_service.list(query.workflow_type).await?;

    Ok(Json(ListApprovalsResponse::from_workflows(&workflows)))
}

/// POST /approvals
pub async fn create_approval(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<CreateApprovalApiRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    debug!(workflow_type = %request.workflow_type, reference = %request.reference_number, "Creating approval");

    let create_request = CreateApprovalRequest {
        workflow_type: request.workflow_type,
        reference_type: request.reference_type,
        reference_number: request.reference_number,
        remarks: request.remarks,
        steps: request
            .steps
            .into_iter()
            .map(ApprovalStepDefinition::from)
            .collect(),
    };

    let workflow = state.approval_service.create(create_request, user_id).await?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

/// GET /approvals/pending
pub async fn list_pending_approvals(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Query(query): Query<PendingApprovalsQuery>,
) -> Result<Json<ListApprovalsResponse>, ApiError> {
    let workflows = state
        .approval_service
        .list_pending_for(query.user_id.unwrap_or(user_id), query.role)
        .await?;

    Ok(Json(ListApprovalsResponse::from_workflows(&workflows)))
}

/// GET /approvals/{approval_id}
pub async fn get_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let workflow = state
        .approval_service
        .get(&approval_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Approval workflow '{}' not found", approval_id))
        })?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

/// POST /approvals/{approval_id}/approve
pub async fn approve_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(approval_id): Path<String>,
    OptionalJson(request): OptionalJson<StepActionRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let workflow = state
        .approval_service
        .approve_workflow_step(&approval_id, user_id, request.step_number, request.comments)
        .await?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

/// POST /approvals/{approval_id}/reject
pub async fn reject_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(approval_id): Path<String>,
    Json(request): Json<RejectApprovalRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let workflow = state
        .approval_service
        .reject_workflow_step(
            &approval_id,
            user_id,
            &request.rejection_reason,
            request.step_number,
        )
        .await?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

/// POST /approvals/{approval_id}/skip
pub async fn skip_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(approval_id): Path<String>,
    OptionalJson(request): OptionalJson<StepActionRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let workflow = state
        .approval_service
        .skip_workflow_step(&approval_id, user_id, request.step_number, request.comments)
        .await?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

/// POST /approvals/{approval_id}/cancel
pub async fn cancel_approval(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(approval_id): Path<String>,
    OptionalJson(request): OptionalJson<CancelApprovalRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let workflow = state
        .approval_service
        .cancel(&approval_id, user_id, request.reason)
        .await?;

    Ok(Json(ApprovalResponse::from(&workflow)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_deserialization() {
        let json = r#"{
            "workflowType": "order_approval",
            "referenceType": "sales_order",
            "referenceNumber": "SO-1001",
            "steps": [
                {"stepName": "manager", "assignedRole": "sales_manager"},
                {"stepName": "credit", "assignedUserId": 30, "isRequired": false}
            ]
        }"#;

        let request: CreateApprovalApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.steps.len(), 2);
        assert!(request.steps[0].is_required);

        let credit = ApprovalStepDefinition::from(request.steps[1].clone());
        assert_eq!(credit.assigned_user_id, Some(30));
        assert!(!credit.is_required);
    }

    #[test]
    fn test_step_status_rendering() {
        let workflow = ApprovalWorkflow::new(
            "order_approval",
            "sales_order",
            "SO-1",
            10,
            vec![ApprovalStepDefinition::new("manager")],
        )
        .unwrap();

        let response = ApprovalResponse::from(&workflow);
        assert_eq!(response.status, "pending");
        assert_eq!(response.steps[0].status, "pending");
        assert_eq!(response.total_steps, 1);
    }
}
