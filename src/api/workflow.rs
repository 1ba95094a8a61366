//! Return workflow endpoints

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::ActingUser;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, OptionalJson};
use crate::domain::workflow::{WorkflowOutcome, WorkflowStep, WorkflowTemplate};
use crate::infrastructure::services::WorkflowInstanceView;

/// Body of `POST /workflow/action/{request_id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub action_by: Option<i64>,
}

/// Body of `POST /workflow/template/{request_id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFromTemplateRequest {
    pub template_id: String,
    /// Supersede an existing instance instead of failing
    #[serde(default)]
    pub replace: bool,
}

/// Body of `POST /workflow/full-flow/{request_id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullFlowRequest {
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Body of `POST /workflow/reject/{request_id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_reason: String,
}

/// Body of `POST /workflow/next-step/{request_id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextStepRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Body of `PUT /workflow/steps/id/{step_id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStepRequest {
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub action_by: Option<i64>,
}

/// Body of `POST /workflow/steps/{request_id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStepRequest {
    pub step: String,
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub action_by: Option<i64>,
}

/// Workflow step as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepResponse {
    pub id: String,
    pub request_type: String,
    pub request_id: i64,
    pub sequence: u32,
    pub step: String,
    pub status: String,
    pub remarks: Option<String>,
    pub action_by: Option<i64>,
    pub action_date: Option<String>,
    pub is_active: String,
    pub created_at: String,
    pub created_by: i64,
    pub updated_at: String,
    pub updated_by: Option<i64>,
}

impl From<&WorkflowStep> for WorkflowStepResponse {
    fn from(step: &WorkflowStep) -> Self {
        Self {
            id: step.id().to_string(),
            request_type: step.request_type().to_string(),
            request_id: step.request_id(),
            sequence: step.sequence(),
            step: step.step().to_string(),
            status: step.status().to_string(),
            remarks: step.remarks().map(String::from),
            action_by: step.action_by(),
            action_date: step.action_date().map(|d| d.to_rfc3339()),
            is_active: if step.is_active() { "Y" } else { "N" }.to_string(),
            created_at: step.created_at().to_rfc3339(),
            created_by: step.created_by(),
            updated_at: step.updated_at().to_rfc3339(),
            updated_by: step.updated_by(),
        }
    }
}

fn step_list(steps: &[WorkflowStep]) -> Vec<WorkflowStepResponse> {
    steps.iter().map(WorkflowStepResponse::from).collect()
}

/// Derived outcome of an instance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
}

impl From<&WorkflowOutcome> for OutcomeResponse {
    fn from(outcome: &WorkflowOutcome) -> Self {
        let mut response = Self {
            state: "not_started",
            current_step: None,
            sequence: None,
            reason: None,
            rejected_by: None,
            rejected_at: None,
        };

        match outcome {
            WorkflowOutcome::NotStarted => {}
            WorkflowOutcome::InProgress {
                current_step,
                sequence,
            } => {
                response.state = "in_progress";
                response.current_step = Some(current_step.clone());
                response.sequence = Some(*sequence);
            }
            WorkflowOutcome::Completed => response.state = "completed",
            WorkflowOutcome::Rejected { reason, by, at } => {
                response.state = "rejected";
                response.reason = reason.clone();
                response.rejected_by = *by;
                response.rejected_at = at.map(|d| d.to_rfc3339());
            }
        }

        response
    }
}

/// `GET /workflow/{request_id}` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResponse {
    pub request_type: String,
    pub request_id: i64,
    pub steps: Vec<WorkflowStepResponse>,
    pub outcome: OutcomeResponse,
}

impl From<&WorkflowInstanceView> for WorkflowResponse {
    fn from(view: &WorkflowInstanceView) -> Self {
        Self {
            request_type: view.request_type.clone(),
            request_id: view.request_id,
            steps: step_list(&view.steps),
            outcome: OutcomeResponse::from(&view.outcome),
        }
    }
}

/// A step together with a human-readable message
#[derive(Debug, Clone, Serialize)]
pub struct StepMessageResponse {
    pub step: Option<WorkflowStepResponse>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStepResponse {
    pub name: String,
    pub initial_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<TemplateStepResponse>,
}

impl From<&WorkflowTemplate> for TemplateResponse {
    fn from(template: &WorkflowTemplate) -> Self {
        Self {
            id: template.id().to_string(),
            name: template.name().to_string(),
            description: template.description().map(String::from),
            steps: template
                .steps()
                .iter()
                .map(|s| TemplateStepResponse {
                    name: s.name.clone(),
                    initial_status: s.initial_status.to_string(),
                })
                .collect(),
        }
    }
}

/// Parse the numeric request id from the path
fn parse_request_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| {
        ApiError::bad_request(format!("Invalid request id '{}': must be an integer", raw))
            .with_param("request_id")
    })
}

/// GET /workflow/steps/{request_id}
pub async fn get_workflow_steps(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<WorkflowStepResponse>>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let steps = state.workflow_service.get_workflow_steps(request_id).await?;

    Ok(Json(step_list(&steps)))
}

/// GET /workflow/{request_id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let view = state.workflow_service.get_workflow(request_id).await?;

    Ok(Json(WorkflowResponse::from(&view)))
}

/// POST /workflow/action/{request_id}
pub async fn apply_action(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<StepMessageResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    debug!(request_id, action = %request.action, "Applying workflow action");

    let outcome = state
        .workflow_service
        .apply_action(
            request_id,
            &request.action,
            request.remarks,
            request.action_by,
            user_id,
        )
        .await?;

    Ok(Json(StepMessageResponse {
        step: outcome.step.as_ref().map(WorkflowStepResponse::from),
        message: outcome.message,
    }))
}

/// GET /workflow/templates
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateResponse>> {
    Json(
        state
            .workflow_service
            .list_templates()
            .iter()
            .map(TemplateResponse::from)
            .collect(),
    )
}

/// GET /workflow/templates/{template_id}
pub async fn get_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = state.workflow_service.get_template(&template_id)?;

    Ok(Json(TemplateResponse::from(&template)))
}

/// POST /workflow/template/{request_id}
pub async fn create_from_template(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    Json(request): Json<CreateFromTemplateRequest>,
) -> Result<Json<Vec<WorkflowStepResponse>>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    debug!(
        request_id,
        template_id = %request.template_id,
        replace = request.replace,
        "Creating workflow from template"
    );

    let template_id = Some(request.template_id);
    let steps = if request.replace {
        state
            .workflow_service
            .reinitialize_workflow(request_id, user_id, template_id)
            .await?
    } else {
        state
            .workflow_service
            .create_initial_workflow(request_id, user_id, template_id)
            .await?
    };

    Ok(Json(step_list(&steps)))
}

/// POST /workflow/full-flow/{request_id}
pub async fn execute_full_flow(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    OptionalJson(request): OptionalJson<FullFlowRequest>,
) -> Result<Json<Vec<WorkflowStepResponse>>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let steps = state
        .workflow_service
        .execute_full_workflow_flow(request_id, user_id, request.template_id)
        .await?;

    Ok(Json(step_list(&steps)))
}

/// POST /workflow/reject/{request_id}
pub async fn reject_request(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<WorkflowStepResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let step = state
        .workflow_service
        .reject_return_request(request_id, user_id, &request.rejection_reason)
        .await?;

    Ok(Json(WorkflowStepResponse::from(&step)))
}

/// POST /workflow/next-step/{request_id}
pub async fn execute_next_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    OptionalJson(request): OptionalJson<NextStepRequest>,
) -> Result<Json<StepMessageResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let step = state
        .workflow_service
        .execute_next_workflow_step(request_id, user_id, request.remarks)
        .await?;

    let message = match &step {
        Some(step) => format!("Step '{}' completed", step.step()),
        None => "Workflow already complete".to_string(),
    };

    Ok(Json(StepMessageResponse {
        step: step.as_ref().map(WorkflowStepResponse::from),
        message,
    }))
}

/// PUT /workflow/steps/id/{step_id}
pub async fn update_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(step_id): Path<String>,
    Json(request): Json<UpdateStepRequest>,
) -> Result<Json<WorkflowStepResponse>, ApiError> {
    debug!(step_id = %step_id, status = %request.status, "Updating workflow step");

    let step = state
        .workflow_service
        .update_workflow_step(
            &step_id,
            &request.status,
            request.remarks,
            request.action_by,
            user_id,
        )
        .await?;

    Ok(Json(WorkflowStepResponse::from(&step)))
}

/// POST /workflow/steps/{request_id}
pub async fn add_step(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(request_id): Path<String>,
    Json(request): Json<AddStepRequest>,
) -> Result<Json<WorkflowStepResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let step = state
        .workflow_service
        .add_workflow_step(
            request_id,
            &request.step,
            &request.status,
            request.remarks,
            request.action_by,
            user_id,
        )
        .await?;

    Ok(Json(WorkflowStepResponse::from(&step)))
}
