//! Vehicle position retrieval with retries.
//!
//! Architecture:
//! - [`FeedTransport`]: one raw request for a branch (HTTP in production)
//! - [`RetryingSource`]: wraps a transport with a [`RetryPolicy`] and decodes
//!   the body with `tramlights_feed_lib`
//! - [`VehicleSource`]: what the cycle driver consumes

use anyhow::{Context, Result};
use derive_more::{Display, Error};
use log::{debug, warn};
use reqwest::blocking::Client;
use std::time::Duration;
use tramlights_feed_lib::{parse_vehicles, query_params, FeedError};
use tramlights_position_lib::{Branch, VehicleReading};

use crate::config::{ApiConfig, RetryConfig};

/// Supplies the current vehicles of a branch.
pub trait VehicleSource {
    fn fetch(&mut self, branch: Branch) -> Result<Vec<VehicleReading>, FetchError>;
}

/// Errors from fetching a branch
#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("{branch}: {source}")]
    Feed { branch: Branch, source: FeedError },
    #[display("{branch}: gave up after {attempts} attempts ({last_error})")]
    RetriesExhausted {
        branch: Branch,
        attempts: u32,
        last_error: String,
    },
}

/// Failure to obtain a response body at all (connection, timeout, HTTP status)
#[derive(Debug, Display, Error)]
#[display("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One request for a branch's raw response body.
pub trait FeedTransport {
    fn get_body(&mut self, branch: Branch) -> Result<String, TransportError>;
}

/// Blocking HTTP transport against the position API
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    route_id: String,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(api.request_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            endpoint: api.endpoint.clone(),
            route_id: api.route_id.clone(),
        })
    }
}

impl FeedTransport for HttpTransport {
    fn get_body(&mut self, branch: Branch) -> Result<String, TransportError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query_params(&self.route_id, branch))
            .send()
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(format!("HTTP {status}")));
        }
        response
            .text()
            .map_err(|e| TransportError::new(e.to_string()))
    }
}

/// When and how often a branch fetch is repeated.
///
/// Empty bodies wait a fixed `empty_body_delay`. Transport failures wait
/// `connection_error_delay`, doubling with each consecutive failure up to
/// `max_delay`. Undecodable bodies are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub empty_body_delay: Duration,
    pub connection_error_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            empty_body_delay: Duration::from_millis(cfg.empty_body_delay_ms),
            connection_error_delay: Duration::from_millis(cfg.connection_error_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }

    /// Wait after the `failures`-th consecutive transport failure (1-based)
    pub fn transport_delay(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.connection_error_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// [`VehicleSource`] that retries a [`FeedTransport`] according to a [`RetryPolicy`].
pub struct RetryingSource<T, F = fn(Duration)> {
    transport: T,
    policy: RetryPolicy,
    sleep: F,
}

/// Production source: HTTP with thread sleeps between attempts
pub type HttpVehicleSource = RetryingSource<HttpTransport>;

impl<T: FeedTransport> RetryingSource<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            sleep: std::thread::sleep,
        }
    }
}

impl<T: FeedTransport, F: FnMut(Duration)> RetryingSource<T, F> {
    #[cfg(test)]
    pub fn with_sleeper(transport: T, policy: RetryPolicy, sleep: F) -> Self {
        Self {
            transport,
            policy,
            sleep,
        }
    }
}

impl<T: FeedTransport, F: FnMut(Duration)> VehicleSource for RetryingSource<T, F> {
    fn fetch(&mut self, branch: Branch) -> Result<Vec<VehicleReading>, FetchError> {
        let mut transport_failures = 0;
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            let delay = match self.transport.get_body(branch) {
                Ok(body) => match parse_vehicles(&body) {
                    Ok(readings) => {
                        debug!("{branch}: {} vehicles (attempt {attempt})", readings.len());
                        return Ok(readings);
                    }
                    Err(e) if e.is_retryable() => {
                        last_error = e.to_string();
                        self.policy.empty_body_delay
                    }
                    Err(source) => return Err(FetchError::Feed { branch, source }),
                },
                Err(e) => {
                    transport_failures += 1;
                    last_error = e.to_string();
                    self.policy.transport_delay(transport_failures)
                }
            };

            if attempt < self.policy.max_attempts {
                warn!(
                    "{branch}: {last_error}, retrying in {}ms ({attempt}/{})",
                    delay.as_millis(),
                    self.policy.max_attempts
                );
                (self.sleep)(delay);
            }
        }

        Err(FetchError::RetriesExhausted {
            branch,
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned responses, recording which branches were asked for
    struct ScriptedTransport {
        responses: VecDeque<Result<String, TransportError>>,
        requests: Vec<Branch>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(TransportError::new))
                    .collect(),
                requests: Vec::new(),
            }
        }
    }

    impl FeedTransport for ScriptedTransport {
        fn get_body(&mut self, branch: Branch) -> Result<String, TransportError> {
            self.requests.push(branch);
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("script exhausted")))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            empty_body_delay: Duration::from_secs(1),
            connection_error_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(12),
        }
    }

    #[test]
    fn test_transport_delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.transport_delay(1), Duration::from_secs(5));
        assert_eq!(p.transport_delay(2), Duration::from_secs(10));
        assert_eq!(p.transport_delay(3), Duration::from_secs(12));
        assert_eq!(p.transport_delay(40), Duration::from_secs(12));
    }

    #[test]
    fn test_policy_from_config_defaults() {
        let p = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.empty_body_delay, Duration::from_secs(1));
        assert_eq!(p.connection_error_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_first_attempt_success() {
        let mut delays = Vec::new();
        let transport = ScriptedTransport::new(vec![Ok(r#"[{"Pos":"100"}]"#)]);
        let mut source = RetryingSource::with_sleeper(transport, policy(), |d: Duration| delays.push(d));

        let readings = source.fetch(Branch::GuipavasBound).unwrap();
        assert_eq!(readings, vec![VehicleReading::new("100")]);
        assert_eq!(source.transport.requests, vec![Branch::GuipavasBound]);
        drop(source);
        assert!(delays.is_empty());
    }

    #[test]
    fn test_retries_empty_body_then_connection_error() {
        let mut delays = Vec::new();
        let transport = ScriptedTransport::new(vec![
            Ok(""),
            Err("connection refused"),
            Err("connection refused"),
            Ok("[]"),
        ]);
        let mut source = RetryingSource::with_sleeper(transport, policy(), |d: Duration| delays.push(d));

        let readings = source.fetch(Branch::GouesnouBound).unwrap();
        assert!(readings.is_empty());
        drop(source);
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10)
            ]
        );
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut delays = Vec::new();
        let transport = ScriptedTransport::new(vec![]);
        let mut source = RetryingSource::with_sleeper(transport, policy(), |d: Duration| delays.push(d));

        let err = source.fetch(Branch::PlouzaneBound).unwrap_err();
        match err {
            FetchError::RetriesExhausted {
                branch,
                attempts,
                last_error,
            } => {
                assert_eq!(branch, Branch::PlouzaneBound);
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "script exhausted");
            }
            FetchError::Feed { .. } => panic!("expected RetriesExhausted"),
        }
        assert_eq!(source.transport.requests.len(), 4);
        drop(source);
        // No sleep after the final attempt
        assert_eq!(delays.len(), 3);
    }

    /// Accept one connection, answer it with `response` and hand back the
    /// request line.
    fn serve_once(response: &'static str) -> (ApiConfig, std::thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let api = ApiConfig {
            endpoint: format!("http://{}/p", listener.local_addr().unwrap()),
            ..ApiConfig::default()
        };
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 0 && !header.trim().is_empty() {
                header.clear();
            }
            stream.write_all(response.as_bytes()).unwrap();
            request_line.trim().to_string()
        });
        (api, handle)
    }

    #[test]
    fn test_http_body_and_query() {
        let (api, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 13\r\nConnection: close\r\n\r\n[{\"Pos\":\"1\"}]",
        );
        let mut transport = HttpTransport::new(&api).unwrap();

        let body = transport.get_body(Branch::GouesnouBound).unwrap();
        assert_eq!(body, r#"[{"Pos":"1"}]"#);
        assert_eq!(
            server.join().unwrap(),
            "GET /p?format=json&route_id=A&trip_headsign=porte+de+gouesnou HTTP/1.1"
        );
    }

    #[test]
    fn test_http_error_status_is_transport_failure() {
        let (api, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let mut transport = HttpTransport::new(&api).unwrap();

        let err = transport.get_body(Branch::GuipavasBound).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503 Service Unavailable");
        server.join().unwrap();
    }

    #[test]
    fn test_invalid_json_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok("<html>"), Ok("[]")]);
        let mut source = RetryingSource::with_sleeper(transport, policy(), |_: Duration| {});

        let err = source.fetch(Branch::GuipavasBound).unwrap_err();
        assert!(matches!(
            err,
            FetchError::Feed {
                branch: Branch::GuipavasBound,
                source: FeedError::Json(_)
            }
        ));
        assert_eq!(source.transport.requests.len(), 1);
    }
}
