pub mod contract;
pub mod user;
