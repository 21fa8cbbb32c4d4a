use crate::state::{AppState, StoreSlot};
use crate::store::{NewSentinel, SentinelRecord, SentinelStore, StoreError, SENTINEL_ID};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

const CONFIG_ERROR: &str = "Server configuration error";
const UPDATED_MESSAGE: &str = "Keep-alive ping successful";
const CREATED_MESSAGE: &str = "Keep-alive ping successful (created new record)";

#[derive(Debug, Serialize)]
struct ConfigErrorBody {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct PingSuccess {
    success: bool,
    message: &'static str,
    data: SentinelRecord,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct PingFailure {
    success: bool,
    error: String,
    timestamp: String,
}

/// Current time as ISO-8601 UTC with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

fn success_response(message: &'static str, data: SentinelRecord) -> Response {
    let body = PingSuccess {
        success: true,
        message,
        data,
        timestamp: now_iso(),
    };
    with_cors((StatusCode::OK, Json(body)).into_response())
}

pub fn failure_response(error: String) -> Response {
    let body = PingFailure {
        success: false,
        error,
        timestamp: now_iso(),
    };
    with_cors((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
}

fn config_error_response() -> Response {
    let body = ConfigErrorBody {
        error: CONFIG_ERROR,
    };
    with_cors((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
}

fn preflight_response() -> Response {
    with_cors(StatusCode::OK.into_response())
}

/// Writes the current time into the sentinel row, creating the row if absent.
pub async fn keep_alive_handler(State(state): State<Arc<AppState>>, method: Method) -> Response {
    if method == Method::OPTIONS {
        return preflight_response();
    }

    info!("Function triggered at {}", now_iso());

    match &state.store {
        StoreSlot::Ready(store) => ping(store.as_ref()).await,
        StoreSlot::Unconfigured => {
            error!("Missing database URL or service key");
            config_error_response()
        }
        StoreSlot::Broken(message) => {
            error!("Function error: {}", message);
            failure_response(message.clone())
        }
    }
}

async fn ping(store: &dyn SentinelStore) -> Response {
    let err = match store.touch(SENTINEL_ID, &now_iso()).await {
        Ok(record) => {
            info!("Successfully pinged database: {:?}", record);
            return success_response(UPDATED_MESSAGE, record);
        }
        Err(err) => err,
    };

    match err {
        StoreError::NotFound => {
            info!("No sentinel row with id {}, creating it", SENTINEL_ID);
            match store.create(&NewSentinel::at(&now_iso())).await {
                Ok(record) => {
                    info!("Created new sentinel record: {:?}", record);
                    success_response(CREATED_MESSAGE, record)
                }
                Err(err) => {
                    error!("Error inserting sentinel record: {}", err);
                    failure_response(err.to_string())
                }
            }
        }
        StoreError::Database { code, message } => {
            error!("Error updating sentinel record ({:?}): {}", code, message);
            failure_response(message)
        }
        StoreError::Transport(err) => {
            error!("Function error: {}", err);
            failure_response(err.to_string())
        }
    }
}
