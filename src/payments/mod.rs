//! Payment provider integration module
//!
//! Card payments go through the Garanti 3-D Secure gateway, hosted payments
//! through PayTR. Both are driven by [`service::PaymentService`] behind the
//! [`traits::PaymentProvider`] interface.

pub mod amount;
pub mod error_codes;
pub mod providers;
pub mod service;
pub mod signature;
pub mod traits;
pub mod types;
