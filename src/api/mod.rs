pub mod models;
pub mod upbit;

pub use upbit::UpbitClient;
