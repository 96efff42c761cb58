// Upstream server fleet: per-server sessions, the manager owning them,
// and the OAuth surface `http` sessions authenticate through.

pub mod manager;
pub mod oauth;
pub mod session;

pub use manager::Fleet;
pub use oauth::{
    AuthorizationMetadata, ClientInformation, InMemoryTokenStore, OAuthProvider, OAuthRecord,
    OAuthTokens, TokenStore,
};
pub use session::{ConnectionState, RootsProvider, Session, ToolDescriptor};
