//! Payment provider implementations
//!
//! Concrete implementations of the PaymentProvider trait: the Garanti BBVA
//! 3-D Secure bank gateway and the PayTR iFrame API.

pub mod garanti;
pub mod paytr;

pub use garanti::{GarantiConfig, GarantiProvider};
pub use paytr::{PaytrConfig, PaytrProvider};
