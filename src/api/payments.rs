//! HTTP adapters for the payment endpoints
//!
//! The bank callback always answers with a browser redirect and the PayTR
//! notification always with `200` plain text; neither surfaces JSON errors.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, warn};

use crate::error::{AppErrorKind, AppResult};
use crate::payments::amount::InstallmentOption;
use crate::payments::error_codes::{failure_message, FailureMessage};
use crate::payments::types::{
    CallbackRequest, ClientContext, InitiatePaymentRequest, InitiatedPayment,
};
use crate::AppState;

/// Body PayTR expects for an accepted notification
pub const PAYTR_ACK: &str = "OK";
/// Body returned when a notification fails hash verification
pub const PAYTR_BAD_HASH: &str = "PAYTR notification failed: bad hash";

/// Client IP as seen behind the reverse proxy
pub fn client_context(headers: &HeaderMap) -> ClientContext {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| ClientContext { ip: ip.to_string() })
        .unwrap_or_default()
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

pub async fn garanti_initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InitiatePaymentRequest>,
) -> AppResult<Json<InitiatedPayment>> {
    let client = client_context(&headers);
    let initiated = state
        .payments
        .initiate(state.garanti.as_ref(), &request, &client)
        .await?;
    Ok(Json(initiated))
}

pub async fn garanti_callback(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    form: Option<Form<HashMap<String, String>>>,
) -> Response {
    let fail_url = &state.redirects.fail_url;

    let Some(txid) = query
        .get("txid")
        .map(|txid| txid.trim().to_string())
        .filter(|txid| !txid.is_empty())
    else {
        warn!("Garanti callback without txid");
        return found(format!("{}?error=missing_txid", fail_url));
    };

    let callback = CallbackRequest {
        query,
        form: form.map(|Form(form)| form).unwrap_or_default(),
    };

    match state.payments.settle(state.garanti.as_ref(), &callback).await {
        Ok(result) if result.is_success() => match result.order_no {
            Some(order_no) => found(format!("{}/{}", state.redirects.success_url, order_no)),
            None => found(format!("{}?txid={}", state.redirects.success_url, txid)),
        },
        Ok(result) => {
            let code = result.response_code.unwrap_or_default();
            let msg = result.response_message.unwrap_or_default();
            found(format!(
                "{}?txid={}&code={}&msg={}",
                fail_url,
                urlencoding::encode(&txid),
                urlencoding::encode(&code),
                urlencoding::encode(&msg)
            ))
        }
        Err(e) if e.is_not_found() || matches!(e.kind, AppErrorKind::Validation { .. }) => {
            warn!("Garanti callback for unknown transaction {}: {}", txid, e);
            found(format!("{}?error=unknown_transaction", fail_url))
        }
        Err(e) => {
            error!("Garanti callback processing failed for {}: {}", txid, e);
            found(format!("{}?error=server_error", fail_url))
        }
    }
}

pub async fn paytr_initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InitiatePaymentRequest>,
) -> AppResult<Json<InitiatedPayment>> {
    let client = client_context(&headers);
    let initiated = state
        .payments
        .initiate(state.paytr.as_ref(), &request, &client)
        .await?;
    Ok(Json(initiated))
}

pub async fn paytr_callback(
    State(state): State<AppState>,
    form: Option<Form<HashMap<String, String>>>,
) -> (StatusCode, &'static str) {
    let callback = CallbackRequest {
        query: HashMap::new(),
        form: form.map(|Form(form)| form).unwrap_or_default(),
    };

    match state.payments.settle(state.paytr.as_ref(), &callback).await {
        Ok(_) => (StatusCode::OK, PAYTR_ACK),
        Err(e) if e.is_signature_mismatch() => (StatusCode::OK, PAYTR_BAD_HASH),
        Err(e) => {
            // PayTR keeps retrying anything but OK; failures are ours to fix.
            error!("PayTR notification processing failed: {}", e);
            (StatusCode::OK, PAYTR_ACK)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentsResponse {
    pub order_id: String,
    pub options: Vec<InstallmentOption>,
}

pub async fn installments(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> AppResult<Json<InstallmentsResponse>> {
    let options = state.payments.installment_options(&order_id).await?;
    Ok(Json(InstallmentsResponse { order_id, options }))
}

#[derive(Debug, Deserialize)]
pub struct FailureMessageQuery {
    pub code: Option<String>,
    pub msg: Option<String>,
}

pub async fn failure_message_lookup(
    Query(query): Query<FailureMessageQuery>,
) -> Json<FailureMessage> {
    Json(failure_message(query.code.as_deref(), query.msg.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_uses_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("85.34.78.112, 10.0.0.1"),
        );
        assert_eq!(client_context(&headers).ip, "85.34.78.112");
    }

    #[test]
    fn test_client_ip_defaults_to_loopback() {
        assert_eq!(client_context(&HeaderMap::new()).ip, "127.0.0.1");
    }
}
