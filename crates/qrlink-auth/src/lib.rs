//! qrlink Auth - Account credential store and bearer tokens
//!
//! Provides account registration and login with Argon2id password hashing,
//! plus HS256 bearer tokens for authenticated API calls.
//!
//! # Login Flow
//!
//! 1. Client registers via `CredentialStore::register()`
//! 2. Client logs in via `CredentialStore::authenticate()`
//! 3. Server issues a bearer token with `CredentialStore::issue_token()`
//! 4. Subsequent requests present the token via the `Authorization` header
//!
//! # Example
//!
//! ```no_run
//! use qrlink_auth::{AccountStorage, CredentialStore, TokenSigner};
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let storage = Arc::new(AccountStorage::new().await.unwrap());
//!     let signer = TokenSigner::new("secret", chrono::Duration::minutes(30));
//!     let store = CredentialStore::new(storage, signer);
//!
//!     let info = store.register("alice", "alice@example.com", "hunter2").await.unwrap();
//!     println!("Registered {}", info.username);
//!
//!     let account = store.authenticate("alice", "hunter2").await.unwrap();
//!     let token = store.issue_token(&account, None).unwrap();
//!     println!("Token: {}", token);
//! }
//! ```

pub mod account;
pub mod credentials;
pub mod storage;
pub mod token;

pub use account::{Account, AccountId, AccountInfo};
pub use credentials::{CredentialError, CredentialResult, CredentialStore};
pub use storage::{AccountStorage, StorageError, StorageResult};
pub use token::{Claims, TokenSigner};
