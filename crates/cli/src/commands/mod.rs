// CLI commands

pub mod files;
pub mod import;
pub mod maintenance;
