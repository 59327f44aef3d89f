//! QIoT Deployer Library
//!
//! Provisions edge devices with sample code, user functions, certificates
//! and connection resources over SSH.

pub mod app;
pub mod archive;
pub mod crypto;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod utils;
