//! Integration tests for the deployer

mod test_client;
mod test_orchestrator;
