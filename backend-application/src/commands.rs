// Write-side use cases
pub mod ledger_commands;
