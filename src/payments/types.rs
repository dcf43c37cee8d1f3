//! Payment request, redirect and settlement types

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::transaction_repository::{ProviderResponse, TransactionStatus};

/// Body of both initiate endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: Option<String>,
    pub card_number: Option<String>,
    /// `MM/YY` or `MM/YYYY`
    pub card_expiry: Option<String>,
    pub card_cvc: Option<String>,
    pub card_holder_name: Option<String>,
    pub installment_count: Option<u32>,
    /// Total including installment commission, computed by the caller
    pub total_amount: Option<Decimal>,
}

/// Request metadata the providers need besides the body
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub ip: String,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
        }
    }
}

/// Ordered form fields; serialises as a JSON object preserving field order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FormFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// What the browser has to do next
#[derive(Debug, Clone)]
pub enum RedirectInstruction {
    /// POST `fields` to `action_url`
    AutoSubmitForm {
        action_url: String,
        fields: FormFields,
        html: String,
    },
    /// Embed the provider's hosted page
    Iframe { token: String, iframe_url: String },
}

/// Display and audit data captured at initiation
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub card_last_four: Option<String>,
    pub card_holder_name: Option<String>,
    pub is_3d_secure: bool,
    pub raw_request: serde_json::Value,
}

/// Result of a provider's initiation step
#[derive(Debug, Clone)]
pub struct Initiation {
    pub instruction: RedirectInstruction,
    pub snapshot: RequestSnapshot,
}

/// A payment attempt that has been persisted as `pending`
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub transaction_id: Uuid,
    pub instruction: RedirectInstruction,
}

impl Serialize for InitiatedPayment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("success", &true)?;
        map.serialize_entry("transactionId", &self.transaction_id)?;
        match &self.instruction {
            RedirectInstruction::AutoSubmitForm {
                action_url,
                fields,
                html,
            } => {
                map.serialize_entry("redirectUrl", action_url)?;
                map.serialize_entry("formData", fields)?;
                map.serialize_entry("formHtml", html)?;
            }
            RedirectInstruction::Iframe { token, iframe_url } => {
                map.serialize_entry("token", token)?;
                map.serialize_entry("iframeUrl", iframe_url)?;
            }
        }
        map.end()
    }
}

/// Raw inbound callback: query string plus form body
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

/// How a callback identifies the transaction it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionLocator {
    /// Internal transaction id carried through the redirect URL
    Id(Uuid),
    /// Human-facing order number; the latest pending attempt is meant
    LatestForOrderNo(String),
}

/// A verified, interpreted callback
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub locator: TransactionLocator,
    pub status: TransactionStatus,
    pub response: ProviderResponse,
    pub raw_response: serde_json::Value,
    /// Whether a successful settlement reduces inventory
    pub decrements_stock: bool,
}

/// Order labels written when a transaction settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderStatusLabels {
    pub status: &'static str,
    pub payment_status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub transaction_id: Uuid,
    pub order_id: Uuid,
    pub order_no: Option<String>,
    pub status: TransactionStatus,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    /// True when the transaction had already settled and nothing was written
    pub replayed: bool,
}

impl SettlementResult {
    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}
