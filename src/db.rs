pub mod counterdb;
pub mod db;
pub mod kycdb;
pub mod memory;
pub mod query_timeout;
pub mod referraldb;

pub use counterdb::CounterStore;
pub use kycdb::KycStore;
pub use referraldb::ReferralCodeStore;
