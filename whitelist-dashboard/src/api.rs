//! JSON routes for the dashboard

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use whitelist_apply::{TestResult, WhitelistService};
use whitelist_core::WhitelistGroup;

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub type ApiResponse = Response<Full<Bytes>>;

const ROUTES: &[&str] = &["/status", "/config", "/validate", "/save", "/reload", "/groups"];

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    config: String,
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    config: String,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
struct GroupsBody {
    groups: Vec<WhitelistGroup>,
}

#[derive(Debug, Serialize)]
struct OpResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OpResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<TestResult> for OpResponse {
    fn from(result: TestResult) -> Self {
        Self {
            success: result.success,
            error: (!result.success).then_some(result.message),
        }
    }
}

#[derive(Debug, Serialize)]
struct GroupsApplyResponse {
    success: bool,
    reloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Set when the file was applied but the group file was not updated
    #[serde(rename = "storeError", skip_serializing_if = "Option::is_none")]
    store_error: Option<String>,
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> ApiResponse {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            tracing::warn!("Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"success":false,"error":"failed to serialize response"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    json(status, &OpResponse::failed(message))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiResponse> {
    serde_json::from_slice(body)
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)))
}

/// Read a request, bounded to [`MAX_BODY_BYTES`], and route it
pub async fn handle<B>(service: Arc<WhitelistService>, req: Request<B>) -> Result<ApiResponse, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    tracing::debug!("{} {}", parts.method, parts.uri.path());

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Ok(error(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
        }
        Err(e) => {
            return Ok(error(StatusCode::BAD_REQUEST, format!("failed to read request body: {}", e)));
        }
    };

    Ok(dispatch(&service, &parts.method, parts.uri.path(), &body).await)
}

/// Route one request with its body already read
pub async fn dispatch(service: &WhitelistService, method: &Method, path: &str, body: &[u8]) -> ApiResponse {
    match (method, path) {
        (&Method::GET, "/status") => json(StatusCode::OK, &service.status().await),

        (&Method::GET, "/config") => match service.current_config().await {
            Ok(view) => json(StatusCode::OK, &view),
            Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },

        (&Method::POST, "/validate") => match parse_body::<ConfigRequest>(body) {
            Ok(req) => json(StatusCode::OK, &OpResponse::from(service.validate(&req.config).await)),
            Err(response) => response,
        },

        (&Method::POST, "/save") => match parse_body::<SaveRequest>(body) {
            Ok(req) => {
                let result = service.save(&req.config, req.path.as_deref()).await;
                json(
                    StatusCode::OK,
                    &OpResponse {
                        success: result.success,
                        error: result.error().map(str::to_string),
                    },
                )
            }
            Err(response) => response,
        },

        (&Method::POST, "/reload") => json(StatusCode::OK, &OpResponse::from(service.reload().await)),

        (&Method::GET, "/groups") => match service.groups().await {
            Ok(groups) => json(StatusCode::OK, &GroupsBody { groups }),
            Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },

        (&Method::POST, "/groups") => {
            let req = match parse_body::<GroupsBody>(body) {
                Ok(req) => req,
                Err(response) => return response,
            };
            match service.set_groups(req.groups).await {
                Ok(result) => json(
                    StatusCode::OK,
                    &GroupsApplyResponse {
                        success: result.success,
                        reloaded: result.reloaded,
                        error: result.error().map(str::to_string),
                        store_error: result.store_error,
                    },
                ),
                Err(e) => json(
                    StatusCode::BAD_REQUEST,
                    &GroupsApplyResponse {
                        success: false,
                        reloaded: false,
                        error: Some(e.to_string()),
                        store_error: None,
                    },
                ),
            }
        }

        (_, path) if ROUTES.contains(&path) => error(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{} not allowed on {}", method, path),
        ),

        _ => error(StatusCode::NOT_FOUND, format!("no route for {} {}", method, path)),
    }
}
