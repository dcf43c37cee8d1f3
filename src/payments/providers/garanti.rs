//! Garanti BBVA virtual POS provider (3-D Secure, `3D_PAY` level)
//!
//! The browser is handed an auto-submitting form that posts card data to the
//! bank's `gt3dengine`. After authentication the bank posts the result back
//! to our callback URL, which carries the transaction id as `?txid=`.

use crate::config::GatewayMode;
use crate::database::transaction_repository::{ProviderResponse, TransactionStatus};
use crate::error::{AppError, AppErrorKind, AppResult, InfrastructureError};
use crate::payments::amount::{installment_field, MAX_INSTALLMENTS};
use crate::payments::signature::{garanti_hash_data, garanti_hashed_password, GarantiHashInput};
use crate::payments::traits::{InitiationContext, PaymentProvider};
use crate::payments::types::{
    CallbackOutcome, CallbackRequest, FormFields, InitiatePaymentRequest, Initiation,
    OrderStatusLabels, RedirectInstruction, RequestSnapshot, TransactionLocator,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use html_escape::encode_double_quoted_attribute;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

const TEST_GATEWAY_URL: &str = "https://sanalposprovtest.garanti.com.tr/servlet/gt3dengine";
const PROD_GATEWAY_URL: &str = "https://sanalposprov.garanti.com.tr/servlet/gt3dengine";

const API_VERSION: &str = "512";
const TXN_TYPE: &str = "sales";
const SECURITY_LEVEL: &str = "3D_PAY";
/// ISO 4217 numeric code for Turkish lira
const CURRENCY_CODE: &str = "949";

/// `mdstatus` values meaning the cardholder was authenticated
const VERIFIED_MD_STATUSES: [&str; 4] = ["1", "2", "3", "4"];
const APPROVED_RESPONSE_CODE: &str = "00";

/// Garanti virtual POS configuration
#[derive(Clone)]
pub struct GarantiConfig {
    pub terminal_id: String,
    pub merchant_id: String,
    pub prov_user_id: String,
    pub prov_password: String,
    pub store_key: String,
    pub mode: GatewayMode,
    /// `gt3dengine` endpoint the form posts to
    pub gateway_url: String,
    /// Our callback endpoint; `txid` is appended per transaction
    pub callback_url: String,
    pub company_name: String,
}

impl fmt::Debug for GarantiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarantiConfig")
            .field("terminal_id", &self.terminal_id)
            .field("merchant_id", &self.merchant_id)
            .field("prov_user_id", &self.prov_user_id)
            .field("prov_password", &"<redacted>")
            .field("store_key", &"<redacted>")
            .field("mode", &self.mode)
            .field("gateway_url", &self.gateway_url)
            .field("callback_url", &self.callback_url)
            .field("company_name", &self.company_name)
            .finish()
    }
}

impl GarantiConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("{} environment variable is required", name),
                    },
                ))
            })
        };

        let mode = match std::env::var("GARANTI_MODE") {
            Ok(value) => value.parse::<GatewayMode>().map_err(|e| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("GARANTI_MODE: {}", e),
                    },
                ))
            })?,
            Err(_) => GatewayMode::Test,
        };

        let gateway_url = std::env::var("GARANTI_3D_URL").unwrap_or_else(|_| {
            match mode {
                GatewayMode::Test => TEST_GATEWAY_URL,
                GatewayMode::Prod => PROD_GATEWAY_URL,
            }
            .to_string()
        });

        Ok(Self {
            terminal_id: required("GARANTI_TERMINAL_ID")?,
            merchant_id: required("GARANTI_MERCHANT_ID")?,
            prov_user_id: std::env::var("GARANTI_PROV_USER_ID")
                .unwrap_or_else(|_| "PROVAUT".to_string()),
            prov_password: required("GARANTI_PROV_PASSWORD")?,
            store_key: required("GARANTI_STORE_KEY")?,
            mode,
            gateway_url,
            callback_url: std::env::var("PAYMENT_CALLBACK_URL").unwrap_or_else(|_| {
                "http://localhost:8080/payments/garanti/callback".to_string()
            }),
            company_name: std::env::var("GARANTI_COMPANY_NAME")
                .unwrap_or_else(|_| "ICEL SOLAR MARKET".to_string()),
        })
    }
}

/// Form body the bank posts back after 3-D authentication
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GarantiCallback {
    mdstatus: String,
    procreturncode: String,
    errmsg: String,
    response: String,
    authcode: String,
    hostrefnum: String,
    transid: String,
    eci: String,
    cavv: String,
    oid: String,
}

/// Garanti BBVA payment provider
pub struct GarantiProvider {
    config: GarantiConfig,
    hashed_password: String,
}

impl GarantiProvider {
    pub fn new(config: GarantiConfig) -> Self {
        let hashed_password = garanti_hashed_password(&config.prov_password, &config.terminal_id);
        Self {
            config,
            hashed_password,
        }
    }

    pub fn config(&self) -> &GarantiConfig {
        &self.config
    }

    /// Callback URL for one transaction; hashed and posted verbatim
    fn callback_url_for(&self, transaction_id: Uuid) -> String {
        let separator = if self.config.callback_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}txid={}", self.config.callback_url, separator, transaction_id)
    }
}

#[async_trait]
impl PaymentProvider for GarantiProvider {
    fn name(&self) -> &'static str {
        "garanti"
    }

    fn validate(&self, request: &InitiatePaymentRequest) -> AppResult<()> {
        let missing: Vec<&str> = [
            ("orderId", &request.order_id),
            ("cardNumber", &request.card_number),
            ("cardExpiry", &request.card_expiry),
            ("cardCvc", &request.card_cvc),
            ("cardHolderName", &request.card_holder_name),
        ]
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(AppError::validation(format!(
                "Missing payment information: {}",
                missing.join(", ")
            )));
        }

        if let Some(count) = request.installment_count {
            if count == 0 || count > MAX_INSTALLMENTS {
                return Err(AppError::validation(format!(
                    "installmentCount must be between 1 and {}",
                    MAX_INSTALLMENTS
                )));
            }
        }

        Ok(())
    }

    async fn initiate(&self, ctx: InitiationContext<'_>) -> AppResult<Initiation> {
        let request = ctx.request;
        let card_number: String = required(&request.card_number, "cardNumber")?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let holder = required(&request.card_holder_name, "cardHolderName")?.trim();
        let cvc = required(&request.card_cvc, "cardCvc")?.trim();
        let (exp_month, exp_year) = parse_expiry(required(&request.card_expiry, "cardExpiry")?)?;

        let amount = ctx.amount_minor.to_string();
        let installments = installment_field(request.installment_count);
        let callback_url = self.callback_url_for(ctx.transaction_id);

        // Success and error URL are the same string in the hash and in the form.
        let hash = garanti_hash_data(&GarantiHashInput {
            terminal_id: &self.config.terminal_id,
            order_id: &ctx.order.order_no,
            amount: &amount,
            currency_code: CURRENCY_CODE,
            success_url: &callback_url,
            error_url: &callback_url,
            txn_type: TXN_TYPE,
            installment_count: &installments,
            store_key: &self.config.store_key,
            hashed_password: &self.hashed_password,
        });

        debug!(
            "Garanti hash computed: order_no={}, amount={}, installments='{}'",
            ctx.order.order_no, amount, installments
        );

        let mut fields = FormFields::new();
        fields.push("mode", self.config.mode.as_str());
        fields.push("apiversion", API_VERSION);
        fields.push("terminalprovuserid", self.config.prov_user_id.as_str());
        fields.push("terminaluserid", self.config.terminal_id.as_str());
        fields.push("terminalmerchantid", self.config.merchant_id.as_str());
        fields.push("terminalid", self.config.terminal_id.as_str());
        fields.push("orderid", ctx.order.order_no.as_str());
        fields.push("successurl", callback_url.as_str());
        fields.push("errorurl", callback_url.as_str());
        fields.push(
            "customeremailaddress",
            ctx.order.guest_email.clone().unwrap_or_default(),
        );
        fields.push("customeripaddress", ctx.client.ip.as_str());
        fields.push("companyname", self.config.company_name.as_str());
        fields.push("lang", "tr");
        fields.push(
            "txntimestamp",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        fields.push("refreshtime", "1");
        fields.push("secure3dsecuritylevel", SECURITY_LEVEL);
        fields.push("secure3dhash", hash);
        fields.push("txnamount", amount.as_str());
        fields.push("txntype", TXN_TYPE);
        fields.push("txncurrencycode", CURRENCY_CODE);
        fields.push("txninstallmentcount", installments.as_str());
        fields.push("cardholdername", holder);
        fields.push("cardnumber", card_number.as_str());
        fields.push("cardexpiredatemonth", exp_month);
        fields.push("cardexpiredateyear", exp_year);
        fields.push("cardcvv2", cvc);

        let html = auto_submit_html(&self.config.gateway_url, &fields);

        info!(
            "Garanti 3D form prepared: order_no={}, transaction_id={}, amount={}",
            ctx.order.order_no, ctx.transaction_id, amount
        );

        let last_four = card_number
            .get(card_number.len().saturating_sub(4)..)
            .unwrap_or_default()
            .to_string();

        Ok(Initiation {
            instruction: RedirectInstruction::AutoSubmitForm {
                action_url: self.config.gateway_url.clone(),
                fields,
                html,
            },
            snapshot: RequestSnapshot {
                card_last_four: Some(last_four),
                card_holder_name: Some(holder.to_string()),
                is_3d_secure: true,
                raw_request: serde_json::json!({
                    "provider": self.name(),
                    "order_no": ctx.order.order_no,
                    "amount": amount,
                    "installment_count": installments,
                    "terminal_id": self.config.terminal_id,
                    "merchant_id": self.config.merchant_id,
                }),
            },
        })
    }

    fn parse_callback(&self, callback: &CallbackRequest) -> AppResult<CallbackOutcome> {
        let txid = callback
            .query
            .get("txid")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::validation("txid query parameter is required"))?;
        let transaction_id = Uuid::parse_str(txid.trim())
            .map_err(|_| AppError::validation(format!("txid '{}' is not a valid id", txid)))?;

        let raw_response = serde_json::to_value(&callback.form)
            .map_err(|e| AppError::validation(format!("unreadable callback body: {}", e)))?;
        let body: GarantiCallback = serde_json::from_value(raw_response.clone())
            .map_err(|e| AppError::validation(format!("unreadable callback body: {}", e)))?;

        let authenticated = VERIFIED_MD_STATUSES.contains(&body.mdstatus.as_str());
        let approved = body.procreturncode == APPROVED_RESPONSE_CODE;
        let status = if authenticated && approved {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failed
        };

        let message = if body.errmsg.is_empty() {
            body.response.clone()
        } else {
            body.errmsg.clone()
        };
        let failed = status == TransactionStatus::Failed;

        info!(
            "Garanti callback: transaction_id={}, oid={}, mdstatus={}, procreturncode={}, status={}",
            transaction_id, body.oid, body.mdstatus, body.procreturncode, status
        );

        Ok(CallbackOutcome {
            locator: TransactionLocator::Id(transaction_id),
            status,
            response: ProviderResponse {
                md_status: non_empty(&body.mdstatus),
                response_code: non_empty(&body.procreturncode),
                response_message: non_empty(&message),
                auth_code: non_empty(&body.authcode),
                host_ref_num: non_empty(&body.hostrefnum),
                provider_transaction_id: non_empty(&body.transid),
                eci: non_empty(&body.eci),
                cavv: non_empty(&body.cavv),
                error_code: if failed { non_empty(&body.procreturncode) } else { None },
                error_message: if failed { non_empty(&message) } else { None },
            },
            raw_response,
            decrements_stock: false,
        })
    }

    fn order_labels(&self, status: TransactionStatus) -> OrderStatusLabels {
        match status {
            TransactionStatus::Success => OrderStatusLabels {
                status: "approved",
                payment_status: "paid",
            },
            _ => OrderStatusLabels {
                status: "payment_failed",
                payment_status: "failed",
            },
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AppResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("Missing payment information: {}", name)))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `MM/YY` or `MM/YYYY` into two-digit month and year
fn parse_expiry(expiry: &str) -> AppResult<(String, String)> {
    let invalid = || AppError::validation("cardExpiry must look like MM/YY");

    let (month, year) = expiry.split_once('/').ok_or_else(invalid)?;
    let month = month.trim();
    let year = year.trim();

    if month.is_empty()
        || month.len() > 2
        || year.len() < 2
        || !month.chars().all(|c| c.is_ascii_digit())
        || !year.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    Ok((format!("{:0>2}", month), year[year.len() - 2..].to_string()))
}

fn auto_submit_html(action_url: &str, fields: &FormFields) -> String {
    let inputs: Vec<String> = fields
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}" />"#,
                encode_double_quoted_attribute(name),
                encode_double_quoted_attribute(value)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>3D Secure</title></head>
<body onload="document.getElementById('paymentForm').submit();">
<p>3D Secure sayfasına yönlendiriliyorsunuz...</p>
<form id="paymentForm" method="POST" action="{}">
{}
</form>
</body>
</html>"#,
        encode_double_quoted_attribute(action_url),
        inputs.join("\n")
    )
}
