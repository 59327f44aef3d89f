pub mod apps;
pub mod certificates;
pub mod client;
pub mod connections;
pub mod queue;
pub mod things;
pub mod users;
