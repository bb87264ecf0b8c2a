pub mod provision;

pub use provision::{ProvisionCommands, handle_provision_command};
