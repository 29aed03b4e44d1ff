// lib.rs
#![warn(clippy::large_futures)]

pub use std::sync::Arc;

pub use anyhow::bail;
pub use tokio::time::{sleep, Duration};

mod config;
pub use config::*;

mod store;
pub use store::*;

mod apcache;
pub use apcache::*;

pub mod coap;

mod flags;
pub use flags::*;

mod command;
pub use command::*;

mod state;
pub use state::*;

mod measure;
pub use measure::*;

mod wifi;
pub use wifi::*;

mod transport;
pub use transport::*;

mod network;
pub use network::*;

mod sampler;
pub use sampler::*;

mod node;
pub use node::*;

mod console;
pub use console::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Below anything a DS18B20 can report; marks "no reading".
pub const NO_TEMP: f32 = -1000.0;

// EOF
