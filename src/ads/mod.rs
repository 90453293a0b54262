//! Outbound Google Ads calls authorized by the token manager.
//!
//! Every authenticated call goes through [`call_with_auth`], which owns the
//! one-refresh-one-retry policy for tokens the remote API rejects.

mod google;

pub use google::{ClickConversionUpload, GoogleAdsClient, GoogleAdsError};

use crate::oauth::{OAuthError, TokenManager};
use std::future::Future;

/// Implemented by call errors that can signal the access token was rejected.
pub trait AuthRejection {
    fn is_auth_rejection(&self) -> bool;
}

/// Run `call` with a valid access token.
///
/// If the call fails with an auth rejection, the token is force-refreshed
/// and the call is retried exactly once; the retry's outcome is returned.
pub async fn call_with_auth<T, E, F, Fut>(tokens: &TokenManager, mut call: F) -> Result<T, E>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<OAuthError> + AuthRejection,
{
    let access_token = tokens.get_valid_access_token().await?;

    match call(access_token).await {
        Err(e) if e.is_auth_rejection() => {
            tracing::info!("Access token rejected by API, refreshing and retrying once");
            let issued = tokens.refresh_access_token().await?;
            call(issued.access_token).await
        }
        result => result,
    }
}
