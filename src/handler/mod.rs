pub mod kyc;
pub mod referral;
pub mod webhook;
