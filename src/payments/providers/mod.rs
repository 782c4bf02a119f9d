pub mod zalopay;

pub use zalopay::{ZaloPayConfig, ZaloPayProvider};
