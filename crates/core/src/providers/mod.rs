pub mod traits;

// Backend implementations
pub mod firebase_auth;
pub mod firestore;
pub mod memory;
