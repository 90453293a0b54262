//! OAuth 2.0 authorization and token lifecycle for the Google Ads integration.
//!
//! Implements the authorization code flow:
//! 1. Operator calls GET /oauth/authorize → receives consent URL bound to a CSRF state
//! 2. Operator authorizes on Google's consent screen
//! 3. Google redirects to /oauth/callback with `code` and `state`
//! 4. State is validated and consumed, code is exchanged for tokens
//! 5. Tokens are written through to the credential store
//! 6. Outbound calls ask the [`TokenManager`] for a valid token, which
//!    refreshes transparently once the cached one is inside the expiry buffer

mod error;
mod exchange;
mod flow;
mod provider;
mod state_manager;
mod token_manager;

pub use error::{AuthError, CallbackError, OAuthError, ProviderError};
pub use exchange::{TokenClient, TokenGrant, TokenIntrospection, FALLBACK_LIFETIME_SECONDS};
pub use flow::{AuthorizationFlow, AuthorizationRequest, CallbackParams, FlowStatus};
pub use provider::{ClientCredentials, OAuthProvider};
pub use state_manager::{run_state_cleanup, PendingState, StateManager};
pub use token_manager::{IssuedToken, TokenInfo, TokenManager, REFRESH_BUFFER_SECONDS};
