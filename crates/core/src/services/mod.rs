pub mod deadline;
pub mod directory_service;
pub mod ledger_service;
pub mod session_gate;
