//! UCS management API client: service-profile resolution and fault
//! probing over one shared auth-retry loop.

use crate::error::UcsError;
use crate::token::TokenManager;
use crate::transport::UcsTransport;
use crate::xml;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts allowed per API call chain before the failure is permanent.
/// A misconfigured credential must not spin forever against the
/// controller.
pub const MAX_AUTH_ATTEMPTS: u32 = 5;

pub struct UcsClient {
    transport: Arc<dyn UcsTransport>,
    tokens: TokenManager,
}

impl UcsClient {
    pub fn new(transport: Arc<dyn UcsTransport>, tokens: TokenManager) -> Self {
        Self { transport, tokens }
    }

    /// Service profile dn currently assigned to `dn`
    /// (`sys/chassis-<n>/blade-<n>`). An unassigned blade yields an empty
    /// string, which is not a failure.
    pub fn service_profile(&self, host: &str, dn: &str) -> Result<String, UcsError> {
        let response = self.authed_call(host, |token| xml::config_resolve_dn(token, dn))?;
        Ok(xml::assigned_to_dn(&response).unwrap_or_default())
    }

    /// Number of outstanding `faultInst` objects for `dn` with the given
    /// cause and a severity *other than* `severity_ne`.
    pub fn outstanding_faults(
        &self,
        host: &str,
        dn: &str,
        cause: &str,
        severity_ne: &str,
    ) -> Result<usize, UcsError> {
        let response = self.authed_call(host, |token| {
            xml::config_resolve_faults(token, dn, cause, severity_ne)
        })?;
        Ok(xml::fault_instance_count(&response))
    }

    /// Issue an authenticated request, re-logging-in on authorization
    /// failure, bounded at [`MAX_AUTH_ATTEMPTS`]. Transport failures are
    /// not auth failures and propagate immediately.
    fn authed_call(
        &self,
        host: &str,
        build_body: impl Fn(&str) -> String,
    ) -> Result<String, UcsError> {
        for attempt in 1..=MAX_AUTH_ATTEMPTS {
            let token = match self.tokens.acquire(host) {
                Ok(token) => token,
                Err(e @ (UcsError::Transport(_) | UcsError::Io(_))) => return Err(e),
                Err(e) => {
                    warn!(host, attempt, "UCS login attempt failed: {e}");
                    continue;
                }
            };
            let response = self.transport.call(host, &build_body(&token))?;
            match xml::error_code(&response) {
                None => return Ok(response),
                Some(code) => {
                    debug!(host, attempt, %code, "UCS rejected token, re-authenticating");
                    self.tokens.invalidate(host);
                }
            }
        }
        Err(UcsError::AuthExhausted)
    }
}
