pub mod classify;
pub mod command;
pub mod connector;
pub mod fs;
pub mod ssh;
pub mod transport;
