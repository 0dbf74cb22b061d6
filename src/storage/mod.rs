pub mod store;

pub use store::{EncryptedBiometricStore, StoredUnauthorized};
