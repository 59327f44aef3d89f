//! Device deployment

pub mod certs;
pub mod connection;
pub mod fsm;
pub mod orchestrator;
pub mod resources;
pub mod sample_code;
pub mod steplog;
pub mod user_function;
pub mod workspace;
