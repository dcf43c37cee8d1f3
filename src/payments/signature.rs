//! Provider message authentication
//!
//! Pure functions computing the digests the Garanti 3-D Secure gateway and
//! PayTR expect. Field order is mandated by the providers; every input is a
//! struct with named fields so call sites cannot reorder values by accident.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Inputs of the Garanti `secure3dhash`, in signing order
#[derive(Debug, Clone, Copy)]
pub struct GarantiHashInput<'a> {
    pub terminal_id: &'a str,
    pub order_id: &'a str,
    /// Integer minor units, e.g. `"100000"` for 1000.00
    pub amount: &'a str,
    pub currency_code: &'a str,
    pub success_url: &'a str,
    pub error_url: &'a str,
    pub txn_type: &'a str,
    /// Empty for a single payment, see [`installment_field`](crate::payments::amount::installment_field)
    pub installment_count: &'a str,
    pub store_key: &'a str,
    pub hashed_password: &'a str,
}

/// Inputs of the PayTR `paytr_token`, in signing order
#[derive(Debug, Clone, Copy)]
pub struct PaytrTokenInput<'a> {
    pub merchant_id: &'a str,
    pub user_ip: &'a str,
    pub merchant_oid: &'a str,
    pub email: &'a str,
    pub payment_amount: &'a str,
    /// Base64 of the basket JSON
    pub user_basket: &'a str,
    pub no_installment: &'a str,
    pub max_installment: &'a str,
    pub currency: &'a str,
    pub test_mode: &'a str,
    pub merchant_salt: &'a str,
}

/// Fields PayTR signs on its payment notification
#[derive(Debug, Clone, Copy)]
pub struct PaytrWebhookInput<'a> {
    pub merchant_oid: &'a str,
    pub merchant_salt: &'a str,
    pub status: &'a str,
    pub total_amount: &'a str,
}

/// `UPPER(HEX(SHA1(password + "0" + terminal_id)))`
pub fn garanti_hashed_password(password: &str, terminal_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    hasher.update(b"0");
    hasher.update(terminal_id.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// `UPPER(HEX(SHA512(terminalId + orderId + amount + ... + hashedPassword)))`
pub fn garanti_hash_data(input: &GarantiHashInput<'_>) -> String {
    let mut hasher = Sha512::new();
    for part in [
        input.terminal_id,
        input.order_id,
        input.amount,
        input.currency_code,
        input.success_url,
        input.error_url,
        input.txn_type,
        input.installment_count,
        input.store_key,
        input.hashed_password,
    ] {
        hasher.update(part.as_bytes());
    }
    hex::encode_upper(hasher.finalize())
}

/// Token sent with the PayTR iFrame token request
pub fn paytr_token(merchant_key: &str, input: &PaytrTokenInput<'_>) -> String {
    hmac_sha256_base64(
        merchant_key,
        &[
            input.merchant_id,
            input.user_ip,
            input.merchant_oid,
            input.email,
            input.payment_amount,
            input.user_basket,
            input.no_installment,
            input.max_installment,
            input.currency,
            input.test_mode,
            input.merchant_salt,
        ],
    )
}

/// Hash PayTR attaches to its payment notification
pub fn paytr_webhook_hash(merchant_key: &str, input: &PaytrWebhookInput<'_>) -> String {
    hmac_sha256_base64(
        merchant_key,
        &[
            input.merchant_oid,
            input.merchant_salt,
            input.status,
            input.total_amount,
        ],
    )
}

/// Recompute the notification hash and compare it in constant time
pub fn verify_paytr_webhook(
    merchant_key: &str,
    input: &PaytrWebhookInput<'_>,
    provided_hash: &str,
) -> bool {
    let expected = paytr_webhook_hash(merchant_key, input);
    expected.as_bytes().ct_eq(provided_hash.as_bytes()).into()
}

fn hmac_sha256_base64(key: &str, parts: &[&str]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part.as_bytes());
    }
    STANDARD.encode(mac.finalize().into_bytes())
}
