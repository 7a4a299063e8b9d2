//! Time-resolved photoluminescence viewer: streak-image parsing, derived
//! H/V profiles with decay fitting, and the exports around them.

pub mod config;
pub mod dashboard;
pub mod data;
pub mod export;
pub mod session;
