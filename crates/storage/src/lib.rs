#![forbid(unsafe_code)]

pub mod remote;
pub mod repository;
pub mod sqlite;

pub use remote::{DocumentStore, RemoteError};
pub use repository::{Storage, StorageError};
