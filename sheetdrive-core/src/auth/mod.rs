//! Credential resolution and access-token exchange

mod credential;
mod token;

pub use credential::{resolve_credential, Credential, CredentialSources};
pub use token::{build_assertion, request_token, AccessToken, SHEETS_SCOPE};
