//! Blocking HTTP transport built on `ureq`.
//!
//! Runs on the fetch task's own thread. Connect and read timeouts bound how
//! long a task can sit in the network stack after it has been cancelled.

use std::error::Error as _;
use std::io::{self, Read};

use log::debug;
use photowall_scheduler::{FetchError, Transport};

use crate::config::FetchConfig;

/// `ureq` agent plus the body limit
pub struct HttpTransport {
    agent: ureq::Agent,
    max_body_bytes: u64,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_bytes
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(FetchError::Status(code)),
            Err(ureq::Error::Transport(err)) => return Err(transport_error(&err)),
        };

        let limit = self.max_body_bytes;
        let declared = response
            .header("Content-Length")
            .and_then(|len| len.trim().parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
        response
            .into_reader()
            .take(limit.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| io_error(&e))?;
        if body.len() as u64 > limit {
            return Err(FetchError::TooLarge { limit });
        }

        debug!("fetched {} bytes from {url}", body.len());
        Ok(body)
    }
}

fn transport_error(err: &ureq::Transport) -> FetchError {
    let timed_out = err
        .source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(is_timeout)
        || err.to_string().contains("timed out");
    if timed_out {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

fn io_error(err: &io::Error) -> FetchError {
    if is_timeout(err) {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
