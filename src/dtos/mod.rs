pub mod kycdtos;
pub mod referraldtos;
