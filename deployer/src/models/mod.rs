pub mod certificate;
pub mod command;
pub mod deployment;
pub mod thing;
