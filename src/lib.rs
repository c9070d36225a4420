pub mod binance;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod indicator;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod notify;
pub mod signals;
pub mod source;
pub mod status_store;
pub mod trader;
