use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::health::NodeHealth;
use crate::model::{NodeFilter, NodeId, ServiceFilter};
use crate::orchestrator::{ControlError, ExpirySweep, FieldError};
use crate::wireguard::NodeWithRuntime;

/// `ControlError` as an HTTP response.
pub struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    errors: &'a [FieldError],
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            other => {
                tracing::error!(error = %other, "Admin request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            message: self.0.public_message(),
            errors: self.0.field_errors(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub interface: String,
    pub host: String,
    pub nodes: usize,
    pub http_services: usize,
    pub tcp_services: usize,
    pub domains: usize,
}

#[derive(Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: NodeWithRuntime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<NodeHealth>,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, ApiError> {
    let plane = &state.plane;
    let all = ServiceFilter::default();

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        interface: plane.mesh().interface_name().to_string(),
        host: plane.config().wireguard.host.clone(),
        nodes: plane.nodes(&NodeFilter::default()).await?.len(),
        http_services: plane.http_services(&all).await?.len(),
        tcp_services: plane.tcp_services(&all).await?.len(),
        domains: plane.domains().await?.len(),
    }))
}

pub async fn get_nodes(
    State(state): State<AdminState>,
    Query(filter): Query<NodeFilter>,
) -> Result<Json<Vec<NodeView>>, ApiError> {
    let nodes = state.plane.nodes_runtime(&filter).await?;
    let views = nodes
        .into_iter()
        .map(|node| {
            let health = state.monitor.get(node.node.address);
            NodeView { node, health }
        })
        .collect();
    Ok(Json(views))
}

pub async fn get_node_config(
    State(state): State<AdminState>,
    Path(id): Path<NodeId>,
) -> Result<Response, ApiError> {
    let conf = state.plane.node_config(id).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], conf).into_response())
}

pub async fn post_expire(State(state): State<AdminState>) -> Result<Json<ExpirySweep>, ApiError> {
    Ok(Json(state.plane.sweep_expired().await?))
}
