// SPDX-License-Identifier: AGPL-3.0-or-later
//! EC2 instance metadata client
//!
//! Speaks IMDSv2 (session token) and falls back to plain IMDSv1 GETs when
//! the token endpoint is unavailable.

use std::time::Duration;
use tracing::{debug, warn};

use super::InstanceMetadataProvider;
use crate::error::{Result, RunVaultError};

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECS: &str = "21600";

/// Blocking client for the metadata service
pub struct Ec2MetadataClient {
    /// Base URL, e.g. `http://169.254.169.254/latest`
    endpoint: String,
    agent: ureq::Agent,
}

impl Ec2MetadataClient {
    /// Create a client against `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn session_token(&self) -> Option<String> {
        let url = format!("{}/api/token", self.endpoint);
        match self
            .agent
            .put(&url)
            .set(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .call()
        {
            Ok(resp) => resp.into_string().ok().map(|token| token.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "IMDSv2 token request failed, falling back to IMDSv1");
                None
            }
        }
    }
}

impl InstanceMetadataProvider for Ec2MetadataClient {
    fn get(&self, key: &str) -> Result<String> {
        let url = format!("{}/meta-data/{}", self.endpoint, key.trim_start_matches('/'));
        let mut request = self.agent.get(&url);
        if let Some(token) = self.session_token() {
            request = request.set(TOKEN_HEADER, &token);
        }

        debug!(url = %url, "Querying instance metadata");
        let body = request
            .call()
            .map_err(|e| RunVaultError::lookup(format!("instance metadata '{key}'"), e))?
            .into_string()
            .map_err(|e| RunVaultError::lookup(format!("instance metadata '{key}'"), e))?;

        let value = body.trim().to_string();
        if value.is_empty() {
            return Err(RunVaultError::lookup(
                format!("instance metadata '{key}'"),
                "empty response",
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Serves `responses.len()` connections, one request each, recording
    /// the request line and any token header seen.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_server = Arc::clone(&seen);

        thread::spawn(move || {
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if request.is_empty() || lower.starts_with("x-aws-ec2-metadata-token:") {
                        request.push_str(line.trim_end());
                        request.push(' ');
                    }
                }
                seen_by_server.lock().unwrap().push(request.trim_end().to_string());

                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
        });

        (format!("http://{addr}/latest"), seen)
    }

    #[test]
    fn test_get_uses_session_token() {
        let (endpoint, seen) = serve(vec![(200, "tok-123"), (200, "10.0.0.5\n")]);
        let client = Ec2MetadataClient::new(endpoint, Duration::from_secs(5));

        assert_eq!(client.private_ip().unwrap(), "10.0.0.5");

        let seen = seen.lock().unwrap();
        assert!(seen[0].starts_with("PUT /latest/api/token"));
        assert!(seen[1].starts_with("GET /latest/meta-data/local-ipv4"));
        assert!(seen[1].to_ascii_lowercase().contains("x-aws-ec2-metadata-token: tok-123"));
    }

    #[test]
    fn test_get_falls_back_without_token() {
        let (endpoint, seen) = serve(vec![(404, ""), (200, "10.1.2.3")]);
        let client = Ec2MetadataClient::new(endpoint, Duration::from_secs(5));

        assert_eq!(client.get("local-ipv4").unwrap(), "10.1.2.3");
        let seen = seen.lock().unwrap();
        assert!(!seen[1].to_ascii_lowercase().contains("x-aws-ec2-metadata-token:"));
    }

    #[test]
    fn test_http_error_is_lookup_failure() {
        let (endpoint, _seen) = serve(vec![(200, "tok"), (500, "boom")]);
        let client = Ec2MetadataClient::new(endpoint, Duration::from_secs(5));

        match client.private_ip() {
            Err(RunVaultError::ExternalLookupFailed { what, .. }) => {
                assert!(what.contains("local-ipv4"))
            }
            other => panic!("Expected ExternalLookupFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_endpoint_is_lookup_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Ec2MetadataClient::new(format!("http://{addr}/latest"), Duration::from_secs(2));
        assert!(matches!(
            client.private_ip(),
            Err(RunVaultError::ExternalLookupFailed { .. })
        ));
    }
}
