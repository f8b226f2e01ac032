//! Collaborator contracts the core is substitutable against.

pub mod bar_port;
pub mod ledger_port;
pub mod analysis_port;
pub mod config_port;
