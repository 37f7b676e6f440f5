pub mod credential;
pub mod oauth;
pub mod token_manager;
pub mod token_store;

pub use credential::Credential;
pub use oauth::{GoogleOAuth, OAuthFlow};
pub use token_manager::CredentialManager;
pub use token_store::TokenStore;
