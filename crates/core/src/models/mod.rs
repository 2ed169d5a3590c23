pub mod account;
pub mod document;
pub mod ledger;
pub mod session;
pub mod settings;
pub mod transaction;
