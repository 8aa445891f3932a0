//! Shared blocking HTTP plumbing for both backends.
//!
//! Requests run one at a time with the transport's default timeouts.

use crate::error::MigrateError;

/// Longest error body kept in a `Rejected` message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .user_agent(concat!("rm2gl/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Join a host and a relative API path with exactly one slash.
pub(crate) fn join_url(host: &str, path: &str) -> String {
    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a ureq failure into the crate taxonomy.
///
/// Transport failures are connectivity errors; HTTP statuses are rejections
/// carrying the (truncated) response body.
pub(crate) fn map_error(host: &str, resource: &'static str, err: ureq::Error) -> MigrateError {
    match err {
        ureq::Error::Status(status, response) => {
            let mut message = response.into_string().unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            MigrateError::Rejected {
                resource,
                status,
                message,
            }
        }
        ureq::Error::Transport(transport) => MigrateError::Connectivity {
            host: host.to_string(),
            reason: transport.to_string(),
        },
    }
}
