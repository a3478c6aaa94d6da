//! Command handlers -- one module per subcommand

pub mod config;
pub mod health;
pub mod status;
pub mod up;
