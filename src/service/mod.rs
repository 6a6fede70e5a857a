pub mod error;
pub mod kyc;
pub mod referral;
pub mod webhook;
