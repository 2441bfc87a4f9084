// Authenticated REST client for the Cinemate streaming backend: credential
// storage and a request dispatcher with transparent, single-flight token
// refresh.
pub mod auth;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod transport;

// Export common types for ease of use
pub use auth::AuthApi;
pub use config::{ApiConfig, DEFAULT_BASE_URL};
pub use credentials::{CredentialStorage, CredentialStore, FileStorage, MemoryStorage, TokenPair};
pub use dispatch::{Dispatcher, REFRESH_PATH};
pub use error::{ApiError, StorageError};
pub use request::{ApiRequest, ApiResponse, AuthMode};
pub use transport::{HttpTransport, ReqwestTransport, WireRequest};
