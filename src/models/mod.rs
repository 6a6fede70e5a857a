pub mod kycmodel;
pub mod referralmodel;
