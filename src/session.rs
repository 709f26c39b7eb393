//! Session and anti-forgery token acquisition
//!
//! Every mutating call must carry the `X-CSRF-Token` obtained on the same
//! session, so a token is always handed out together with its session.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{Result, WriteError};
use crate::transport::{PlanningSession, PlanningTransport};

pub const CSRF_HEADER: &str = "X-CSRF-Token";
const CSRF_FETCH: &str = "Fetch";

/// A session together with the token bound to it
pub struct AuthorizedSession {
    session: Box<dyn PlanningSession>,
    token: Arc<str>,
}

impl AuthorizedSession {
    pub fn session(&self) -> &dyn PlanningSession {
        self.session.as_ref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token handle that can be shared with parallel tasks
    pub fn shared_token(&self) -> Arc<str> {
        Arc::clone(&self.token)
    }
}

/// Opens sessions and fetches anti-forgery tokens
#[derive(Clone)]
pub struct SessionProvider {
    transport: Arc<dyn PlanningTransport>,
}

impl SessionProvider {
    pub fn new(transport: Arc<dyn PlanningTransport>) -> Self {
        Self { transport }
    }

    /// Open an authenticated session without fetching a token
    pub async fn open(&self) -> Result<Box<dyn PlanningSession>> {
        self.transport.open_session().await
    }

    /// Open a session and fetch a fresh anti-forgery token on it
    pub async fn acquire(&self) -> Result<AuthorizedSession> {
        debug!("Fetching CSRF token");
        let session = self.open().await?;

        let reply = session
            .get(
                "",
                &[],
                &[(CSRF_HEADER, CSRF_FETCH), ("Accept", "application/json")],
            )
            .await
            .inspect_err(|e| error!("Failed to get CSRF token: {}", e))?;

        if reply.status == 401 || reply.status == 403 {
            error!("Credentials rejected while fetching CSRF token (HTTP {})", reply.status);
            return Err(WriteError::Authentication { status: reply.status });
        }

        let reply = reply
            .error_for_status("CSRF token request")
            .inspect_err(|e| error!("Failed to get CSRF token: {}", e))?;

        let token = match reply.header(CSRF_HEADER).map(str::trim) {
            Some(token) if !token.is_empty() && !token.eq_ignore_ascii_case(CSRF_FETCH) => token,
            _ => {
                error!("CSRF token not found in response headers");
                return Err(WriteError::Protocol(
                    "CSRF token not found in response headers".to_string(),
                ));
            }
        };

        info!("CSRF token obtained successfully");
        Ok(AuthorizedSession {
            token: Arc::from(token),
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{MockPlatform, Script, TOKEN};

    #[tokio::test]
    async fn test_acquire_returns_token() {
        let platform = MockPlatform::new(Script::default());
        let provider = SessionProvider::new(platform.transport());

        let authorized = provider.acquire().await.unwrap();
        assert_eq!(authorized.token(), TOKEN);
        assert_eq!(platform.open_sessions(), 1);

        let call = &platform.calls()[0];
        assert_eq!(call.method, "GET");
        assert_eq!(call.path, "");
        assert_eq!(call.token.as_deref(), Some("Fetch"));

        drop(authorized);
        assert_eq!(platform.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let platform = MockPlatform::new(Script {
            token_status: 401,
            ..Script::default()
        });
        let provider = SessionProvider::new(platform.transport());

        let err = provider.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(platform.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_header_is_protocol_error() {
        let platform = MockPlatform::new(Script {
            token: None,
            ..Script::default()
        });
        let provider = SessionProvider::new(platform.transport());

        let err = provider.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(platform.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let platform = MockPlatform::new(Script {
            token_status: 503,
            ..Script::default()
        });
        let provider = SessionProvider::new(platform.transport());

        let err = provider.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
