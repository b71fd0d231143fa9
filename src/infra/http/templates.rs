use axum::{
    extract::{
        Path, Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::{
    application::error::AppError,
    domain::{ArtifactName, Parameters},
};

use super::{HttpState, error::ApiError};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

fn parse_name(raw: &str) -> Result<ArtifactName, ApiError> {
    ArtifactName::parse(raw).map_err(|err| ApiError::from(AppError::from(err)))
}

pub(super) async fn put_template(
    State(state): State<HttpState>,
    Path(raw): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(&raw)?;
    let body = body?;
    state
        .templates
        .write(&name, body, &state.call_context())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn get_template(
    State(state): State<HttpState>,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let name = parse_name(&raw)?;
    let source = state.templates.read(&name, &state.call_context()).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], source).into_response())
}

pub(super) async fn delete_template(
    State(state): State<HttpState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(&raw)?;
    state
        .templates
        .delete(&name, &state.call_context())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn apply_template(
    State(state): State<HttpState>,
    Path(raw): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Response, ApiError> {
    let name = parse_name(&raw)?;
    let Query(pairs) = query.map_err(|rejection| {
        ApiError::bad_request("Query string could not be parsed", Some(rejection.body_text()))
    })?;
    let params = Parameters::from_query_pairs(pairs);
    let rendered = state
        .templates
        .apply(&name, &params, &state.call_context())
        .await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], rendered).into_response())
}

pub(super) async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
