//! PayTR iFrame API provider
//!
//! Initiation asks PayTR for an iframe token over HTTPS. Settlement happens
//! through PayTR's server-to-server notification, which has to be answered
//! with a plain `OK`.

use crate::config::GatewayMode;
use crate::database::order_repository::{Order, OrderLine};
use crate::database::transaction_repository::{ProviderResponse, TransactionStatus};
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError, InfrastructureError};
use crate::payments::amount::{format_price, MAX_INSTALLMENTS};
use crate::payments::signature::{
    paytr_token, verify_paytr_webhook, PaytrTokenInput, PaytrWebhookInput,
};
use crate::payments::traits::{InitiationContext, PaymentProvider};
use crate::payments::types::{
    CallbackOutcome, CallbackRequest, InitiatePaymentRequest, Initiation, OrderStatusLabels,
    RedirectInstruction, RequestSnapshot, TransactionLocator,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info, warn};

const PROVIDER: &str = "PayTR";
const TOKEN_PATH: &str = "/odeme/api/get-token";
const IFRAME_PATH: &str = "/odeme/guvenli";

const CURRENCY: &str = "TL";
const NO_INSTALLMENT: &str = "1";
const MAX_INSTALLMENT: &str = "0";
const TIMEOUT_LIMIT_MINUTES: &str = "30";

const DEFAULT_NAME: &str = "Misafir";
const DEFAULT_PHONE: &str = "05000000000";
const DEFAULT_ADDRESS: &str = "Adres bilgisi yok";
const DEFAULT_ITEM_NAME: &str = "Urun";

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").expect("valid merchant_oid pattern"));

/// PayTR merchant configuration
#[derive(Clone)]
pub struct PaytrConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    pub merchant_salt: String,
    pub mode: GatewayMode,
    /// Defaults to https://www.paytr.com
    pub base_url: String,
    /// Storefront page PayTR sends the shopper to on success; `/<merchant_oid>` is appended
    pub ok_url: String,
    pub fail_url: String,
    /// Used when the order has no guest email
    pub fallback_email: String,
    /// Order number prefix restored on notifications (`ORB` for `ORB-20261234`)
    pub order_prefix: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for PaytrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaytrConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &"<redacted>")
            .field("merchant_salt", &"<redacted>")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("ok_url", &self.ok_url)
            .field("fail_url", &self.fail_url)
            .field("fallback_email", &self.fallback_email)
            .field("order_prefix", &self.order_prefix)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for PaytrConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            merchant_key: String::new(),
            merchant_salt: String::new(),
            mode: GatewayMode::Test,
            base_url: "https://www.paytr.com".to_string(),
            ok_url: "http://localhost:5173/payment/success".to_string(),
            fail_url: "http://localhost:5173/payment/fail".to_string(),
            fallback_email: "musteri@icelsolarmarket.com".to_string(),
            order_prefix: "ORB".to_string(),
            timeout_secs: 30,
        }
    }
}

impl PaytrConfig {
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

        let defaults = Self::default();

        let mode = match std::env::var("PAYTR_MODE") {
            Ok(value) => value.parse::<GatewayMode>().map_err(|e| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("PAYTR_MODE: {}", e),
                    },
                ))
            })?,
            Err(_) => defaults.mode,
        };

        Ok(Self {
            merchant_id: required("PAYTR_MERCHANT_ID")?,
            merchant_key: required("PAYTR_MERCHANT_KEY")?,
            merchant_salt: required("PAYTR_MERCHANT_SALT")?,
            mode,
            base_url: std::env::var("PAYTR_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            ok_url: std::env::var("PAYTR_OK_URL").unwrap_or(defaults.ok_url),
            fail_url: std::env::var("PAYTR_FAIL_URL").unwrap_or(defaults.fail_url),
            fallback_email: std::env::var("PAYTR_FALLBACK_EMAIL")
                .unwrap_or(defaults.fallback_email),
            order_prefix: std::env::var("PAYTR_ORDER_PREFIX").unwrap_or(defaults.order_prefix),
            timeout_secs: std::env::var("PAYTR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        })
    }

    fn test_flag(&self) -> &'static str {
        match self.mode {
            GatewayMode::Test => "1",
            GatewayMode::Prod => "0",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    status: String,
    token: Option<String>,
    reason: Option<String>,
}

/// Fields of PayTR's notification POST
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaytrNotification {
    merchant_oid: String,
    status: String,
    total_amount: String,
    hash: String,
    failed_reason_code: String,
    failed_reason_msg: String,
    payment_type: String,
}

/// Replace Turkish letters with their closest ASCII counterpart
pub fn sanitize_turkish(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'ç' => 'c',
            'Ç' => 'C',
            'ğ' => 'g',
            'Ğ' => 'G',
            'ı' => 'i',
            'İ' => 'I',
            'ö' => 'o',
            'Ö' => 'O',
            'ş' => 's',
            'Ş' => 'S',
            'ü' => 'u',
            'Ü' => 'U',
            other => other,
        })
        .collect()
}

/// PayTR only accepts alphanumeric order ids
pub fn merchant_oid(order_no: &str) -> String {
    NON_ALPHANUMERIC.replace_all(order_no, "").into_owned()
}

/// Undo [`merchant_oid`] for order numbers of the form `<prefix>-<rest>`.
///
/// Ids that do not start with the prefix are returned unchanged.
pub fn restore_order_no(merchant_oid: &str, prefix: &str) -> String {
    match merchant_oid.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() && !rest.is_empty() && !rest.starts_with('-') => {
            format!("{}-{}", prefix, rest)
        }
        _ => merchant_oid.to_string(),
    }
}

/// Base64 of `[[name, "unit.xx", qty], ...]`; an order without lines is
/// sent as a single item worth `fallback_total`
fn encode_basket(lines: &[OrderLine], fallback_total: Decimal) -> String {
    let mut items: Vec<(String, String, i32)> = lines
        .iter()
        .map(|line| {
            let name = line
                .product_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_ITEM_NAME);
            (
                sanitize_turkish(name),
                format_price(line.unit_price),
                line.quantity,
            )
        })
        .collect();

    if items.is_empty() {
        items.push((
            DEFAULT_ITEM_NAME.to_string(),
            format_price(fallback_total),
            1,
        ));
    }

    // serde_json cannot fail on strings and integers
    let json = serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string());
    STANDARD.encode(json)
}

fn shipping_address(order: &Order) -> String {
    let field = |name: &str| {
        order
            .shipping_address
            .as_ref()
            .and_then(|address| address.get(name))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let address = format!("{} {}", field("address"), field("city"));
    let address = address.trim();
    if address.is_empty() {
        DEFAULT_ADDRESS.to_string()
    } else {
        address.to_string()
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// PayTR payment provider
pub struct PaytrProvider {
    config: PaytrConfig,
    client: Client,
}

impl PaytrProvider {
    /// Create a new PayTR provider instance
    pub fn new(config: PaytrConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    pub fn config(&self) -> &PaytrConfig {
        &self.config
    }

    /// Ask PayTR for an iframe token
    async fn request_token(&self, form: &[(&str, String)]) -> AppResult<String> {
        let url = format!("{}{}", self.config.base_url, TOKEN_PATH);
        let body = serde_urlencoded::to_string(form).map_err(|e| {
            AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
                provider: PROVIDER.to_string(),
                message: format!("Could not encode token request: {}", e),
                is_retryable: false,
            }))
        })?;

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("PayTR token request failed: {}", e);
                AppError::new(AppErrorKind::External(ExternalError::Network {
                    service: PROVIDER.to_string(),
                    message: e.to_string(),
                }))
            })?;

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let error_msg = format!("HTTP {}: {}", status, response_text);
            error!("PayTR API error: {}", error_msg);
            return Err(AppError::new(AppErrorKind::External(
                ExternalError::PaymentProvider {
                    provider: PROVIDER.to_string(),
                    message: error_msg,
                    is_retryable: status.is_server_error(),
                },
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse PayTR response: {}", e);
            AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
                provider: PROVIDER.to_string(),
                message: format!("Invalid response format: {}", e),
                is_retryable: false,
            }))
        })?;

        match (parsed.status.as_str(), parsed.token) {
            ("success", Some(token)) if !token.is_empty() => Ok(token),
            _ => {
                let reason = parsed
                    .reason
                    .unwrap_or_else(|| "token not issued".to_string());
                error!("PayTR rejected token request: {}", reason);
                Err(AppError::new(AppErrorKind::External(
                    ExternalError::PaymentProvider {
                        provider: PROVIDER.to_string(),
                        message: reason,
                        is_retryable: false,
                    },
                )))
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for PaytrProvider {
    fn name(&self) -> &'static str {
        "paytr"
    }

    fn validate(&self, request: &InitiatePaymentRequest) -> AppResult<()> {
        if request
            .order_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
        {
            return Err(AppError::validation("orderId is required"));
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
        let order = ctx.order;
        let oid = merchant_oid(&order.order_no);
        let email = or_default(&order.guest_email, &self.config.fallback_email);
        let payment_amount = ctx.amount_minor.to_string();
        let basket = encode_basket(ctx.lines, order.grand_total);
        let test_mode = self.config.test_flag();

        let token_hash = paytr_token(
            &self.config.merchant_key,
            &PaytrTokenInput {
                merchant_id: &self.config.merchant_id,
                user_ip: &ctx.client.ip,
                merchant_oid: &oid,
                email: &email,
                payment_amount: &payment_amount,
                user_basket: &basket,
                no_installment: NO_INSTALLMENT,
                max_installment: MAX_INSTALLMENT,
                currency: CURRENCY,
                test_mode,
                merchant_salt: &self.config.merchant_salt,
            },
        );

        let form: Vec<(&str, String)> = vec![
            ("merchant_id", self.config.merchant_id.clone()),
            ("user_ip", ctx.client.ip.clone()),
            ("merchant_oid", oid.clone()),
            ("email", email.clone()),
            ("payment_amount", payment_amount.clone()),
            ("paytr_token", token_hash),
            ("user_basket", basket),
            ("debug_on", test_mode.to_string()),
            ("no_installment", NO_INSTALLMENT.to_string()),
            ("max_installment", MAX_INSTALLMENT.to_string()),
            ("user_name", or_default(&order.guest_name, DEFAULT_NAME)),
            ("user_address", shipping_address(order)),
            ("user_phone", or_default(&order.guest_phone, DEFAULT_PHONE)),
            (
                "merchant_ok_url",
                format!("{}/{}", self.config.ok_url.trim_end_matches('/'), oid),
            ),
            ("merchant_fail_url", self.config.fail_url.clone()),
            ("timeout_limit", TIMEOUT_LIMIT_MINUTES.to_string()),
            ("currency", CURRENCY.to_string()),
            ("test_mode", test_mode.to_string()),
            ("lang", "tr".to_string()),
        ];

        let token = self.request_token(&form).await?;
        let iframe_url = format!("{}{}/{}", self.config.base_url, IFRAME_PATH, token);

        info!(
            "PayTR token issued: order_no={}, merchant_oid={}, amount={}",
            order.order_no, oid, payment_amount
        );

        Ok(Initiation {
            instruction: RedirectInstruction::Iframe { token, iframe_url },
            snapshot: RequestSnapshot {
                card_last_four: None,
                card_holder_name: None,
                is_3d_secure: false,
                raw_request: serde_json::json!({
                    "provider": self.name(),
                    "order_no": order.order_no,
                    "merchant_oid": oid,
                    "payment_amount": payment_amount,
                    "email": email,
                    "user_ip": ctx.client.ip,
                    "test_mode": test_mode,
                }),
            },
        })
    }

    fn parse_callback(&self, callback: &CallbackRequest) -> AppResult<CallbackOutcome> {
        let raw_response = serde_json::to_value(&callback.form)
            .map_err(|e| AppError::validation(format!("unreadable notification: {}", e)))?;
        let notification: PaytrNotification = serde_json::from_value(raw_response.clone())
            .map_err(|e| AppError::validation(format!("unreadable notification: {}", e)))?;

        let authentic = verify_paytr_webhook(
            &self.config.merchant_key,
            &PaytrWebhookInput {
                merchant_oid: &notification.merchant_oid,
                merchant_salt: &self.config.merchant_salt,
                status: &notification.status,
                total_amount: &notification.total_amount,
            },
            &notification.hash,
        );

        if !authentic {
            warn!(
                "PayTR notification hash mismatch: merchant_oid={}",
                notification.merchant_oid
            );
            return Err(AppError::new(AppErrorKind::SignatureMismatch {
                provider: PROVIDER.to_string(),
            }));
        }

        let order_no = restore_order_no(&notification.merchant_oid, &self.config.order_prefix);
        let success = notification.status == "success";

        info!(
            "PayTR notification: merchant_oid={}, order_no={}, status={}, payment_type={}",
            notification.merchant_oid, order_no, notification.status, notification.payment_type
        );

        let response = if success {
            ProviderResponse {
                response_code: Some("00".to_string()),
                response_message: Some("Basarili".to_string()),
                ..Default::default()
            }
        } else {
            let code = (!notification.failed_reason_code.is_empty())
                .then(|| notification.failed_reason_code.clone());
            let message = (!notification.failed_reason_msg.is_empty())
                .then(|| notification.failed_reason_msg.clone());
            ProviderResponse {
                response_code: code.clone(),
                response_message: message.clone(),
                error_code: code,
                error_message: message,
                ..Default::default()
            }
        };

        Ok(CallbackOutcome {
            locator: TransactionLocator::LatestForOrderNo(order_no),
            status: if success {
                TransactionStatus::Success
            } else {
                TransactionStatus::Failed
            },
            response,
            raw_response,
            decrements_stock: true,
        })
    }

    fn order_labels(&self, status: TransactionStatus) -> OrderStatusLabels {
        match status {
            TransactionStatus::Success => OrderStatusLabels {
                status: "paid",
                payment_status: "paid",
            },
            _ => OrderStatusLabels {
                status: "pending_payment",
                payment_status: "failed",
            },
        }
    }

    fn order_payment_method(&self) -> Option<&'static str> {
        Some("paytr")
    }
}
