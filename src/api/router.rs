use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::approvals;
use super::health;
use super::middleware::logging_middleware;
use super::state::AppState;
use super::workflow;

/// Create a minimal router without state
/// Note: /ready is not available without state
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::live_check))
        .layer(TraceLayer::new_for_http())
}

/// Return workflow routes
fn workflow_router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(workflow::list_templates))
        .route("/templates/{template_id}", get(workflow::get_template))
        .route("/template/{request_id}", post(workflow::create_from_template))
        .route("/full-flow/{request_id}", post(workflow::execute_full_flow))
        .route("/next-step/{request_id}", post(workflow::execute_next_step))
        .route("/reject/{request_id}", post(workflow::reject_request))
        .route("/action/{request_id}", post(workflow::apply_action))
        .route(
            "/steps/{request_id}",
            get(workflow::get_workflow_steps).post(workflow::add_step),
        )
        .route("/steps/id/{step_id}", put(workflow::update_step))
        .route("/{request_id}", get(workflow::get_workflow))
}

/// Approval workflow routes
fn approvals_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(approvals::list_approvals).post(approvals::create_approval),
        )
        .route("/pending", get(approvals::list_pending_approvals))
        .route("/{approval_id}", get(approvals::get_approval))
        .route("/{approval_id}/approve", post(approvals::approve_step))
        .route("/{approval_id}/reject", post(approvals::reject_step))
        .route("/{approval_id}/skip", post(approvals::skip_step))
        .route("/{approval_id}/cancel", post(approvals::cancel_approval))
}

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/workflow", workflow_router())
        .nest("/approvals", approvals_router())
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::api::middleware::USER_ID_HEADER;
    use crate::infrastructure::approval::StorageApprovalWorkflowRepository;
    use crate::infrastructure::services::{ApprovalWorkflowService, ReturnWorkflowService};
    use crate::infrastructure::storage::StorageFactory;
    use crate::infrastructure::workflow::StorageWorkflowStepRepository;

    fn app() -> Router {
        let steps = StorageWorkflowStepRepository::new(StorageFactory::create(None, "workflow_steps"));
        let approvals =
            StorageApprovalWorkflowRepository::new(StorageFactory::create(None, "approval_workflows"));

        let state = AppState::new(
            Arc::new(ReturnWorkflowService::new(Arc::new(steps))),
            Arc::new(ApprovalWorkflowService::new(Arc::new(approvals))),
        );

        create_router_with_state(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, "7");

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = app();

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_three_step_flow_over_http() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/workflow/template/42",
            Some(json!({"templateId": "quick_return"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["status"], "in_progress");
        assert_eq!(body[0]["isActive"], "Y");

        let (status, body) = send(&app, "POST", "/workflow/next-step/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Step 'submitted' completed");
        assert_eq!(body["step"]["actionBy"], 7);

        let (_, body) = send(&app, "GET", "/workflow/steps/42", None).await;
        assert_eq!(body[1]["status"], "in_progress");

        send(&app, "POST", "/workflow/next-step/42", None).await;
        let (_, body) = send(&app, "POST", "/workflow/next-step/42", None).await;
        assert_eq!(body["step"]["step"], "completed");

        let (status, body) = send(&app, "POST", "/workflow/next-step/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["step"].is_null());
        assert_eq!(body["message"], "Workflow already complete");

        let (_, body) = send(&app, "GET", "/workflow/42", None).await;
        assert_eq!(body["outcome"]["state"], "completed");
        assert_eq!(body["requestType"], "return_request");
    }

    #[tokio::test]
    async fn test_duplicate_template_is_conflict() {
        let app = app();
        let body = json!({"templateId": "quick_return"});

        let (status, _) = send(&app, "POST", "/workflow/template/1", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/workflow/template/1", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "conflict_error");

        let (status, _) = send(
            &app,
            "POST",
            "/workflow/template/1",
            Some(json!({"templateId": "standard_return", "replace": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reject_over_http() {
        let app = app();
        send(&app, "POST", "/workflow/full-flow/5", Some(json!({}))).await;

        let (status, _) = send(
            &app,
            "POST",
            "/workflow/reject/5",
            Some(json!({"rejectionReason": "too late"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        send(&app, "POST", "/workflow/template/6", Some(json!({"templateId": "quick_return"}))).await;
        let (status, body) = send(
            &app,
            "POST",
            "/workflow/reject/6",
            Some(json!({"rejectionReason": "damaged"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["remarks"], "damaged");

        let (_, body) = send(&app, "GET", "/workflow/6", None).await;
        assert_eq!(body["outcome"]["state"], "rejected");
        assert_eq!(body["outcome"]["reason"], "damaged");
    }

    #[tokio::test]
    async fn test_missing_user_header_is_bad_request() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/workflow/next-step/1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = app();

        let (status, body) = send(&app, "GET", "/workflow/templates/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found_error");

        let (status, body) = send(&app, "GET", "/workflow/steps/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["param"], "request_id");

        let (status, _) = send(&app, "POST", "/workflow/reject/99", Some(json!({"rejectionReason": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "PUT",
            "/workflow/steps/id/not-a-uuid",
            Some(json!({"status": "completed"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_step_edit_guards_over_http() {
        let app = app();

        let (_, steps) = send(&app, "POST", "/workflow/template/42", Some(json!({"templateId": "standard_return"}))).await;
        let warehouse = format!("/workflow/steps/id/{}", steps[2]["id"].as_str().unwrap());

        let (status, body) = send(&app, "PUT", &warehouse, Some(json!({"status": "in_progress"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "conflict_error");

        let (status, body) = send(&app, "PUT", &warehouse, Some(json!({"status": "rejected"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Rejection reason is required");

        let (status, body) = send(
            &app,
            "PUT",
            &warehouse,
            Some(json!({"status": "rejected", "remarks": "Seal broken"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["actionBy"], 7);
    }

    #[tokio::test]
    async fn test_templates_listing() {
        let app = app();

        let (status, body) = send(&app, "GET", "/workflow/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["id"] == "standard_return"));
    }

    #[tokio::test]
    async fn test_approval_lifecycle_over_http() {
        let app = app();

        let (status, created) = send(
            &app,
            "POST",
            "/approvals",
            Some(json!({
                "workflowType": "order_approval",
                "referenceType": "sales_order",
                "referenceNumber": "SO-77",
                "steps": [
                    {"stepName": "manager", "assignedUserId": 7},
                    {"stepName": "finance", "assignedRole": "finance"}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["status"], "pending");
        let id = created["id"].as_str().unwrap().to_string();

        let (_, pending) = send(&app, "GET", "/approvals/pending", None).await;
        assert_eq!(pending["total"], 1);

        let (status, body) = send(&app, "POST", &format!("/approvals/{}/approve", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentStep"], 2);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/approvals/{}/reject", id),
            Some(json!({"rejectionReason": "over budget"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");

        let (status, _) = send(&app, "POST", &format!("/approvals/{}/cancel", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, list) = send(&app, "GET", "/approvals?workflowType=order_approval", None).await;
        assert_eq!(list["total"], 1);

        let (status, body) = send(&app, "GET", "/approvals/missing", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["param"], "id");
    }
}
