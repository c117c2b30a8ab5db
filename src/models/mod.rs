pub mod candle;
pub mod config;
pub mod pivot;
pub mod result;
pub mod strategy;
pub mod trade;
