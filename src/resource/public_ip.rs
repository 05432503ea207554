//! Public address discovery for the reconnect instructions

use cmdkit::RetryConfig;
use declarative::{ApplyContext, Error, Resource, ResourceState, Result};
use std::net::IpAddr;

/// Fact key under which the discovered address is stored
pub const PUBLIC_IP_FACT: &str = "public_ip";

const LOOKUP_URLS: [&str; 2] = ["https://api.ipify.org", "https://ifconfig.me/ip"];

/// Ask an echo service for the host's public address
///
/// The host is not changed; "applying" records the address as a run fact.
#[derive(Debug, Clone)]
pub struct PublicIp {
    urls: Vec<String>,
}

impl PublicIp {
    pub fn new() -> Self {
        Self::with_urls(LOOKUP_URLS)
    }

    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    fn lookup(&self, ctx: &ApplyContext, url: &str) -> Result<IpAddr> {
        let body = ctx.runner.fetch(url, &RetryConfig::default())?;
        let text = String::from_utf8_lossy(&body);
        text.trim()
            .parse()
            .map_err(|_| Error::system(format!("{url} returned '{}', not an address", text.trim())))
    }
}

impl Default for PublicIp {
    fn default() -> Self {
        Self::new()
    }
}

impl Resource for PublicIp {
    fn id(&self) -> String {
        PUBLIC_IP_FACT.to_string()
    }

    fn description(&self) -> String {
        "Discover the public IP address".to_string()
    }

    fn resource_type(&self) -> &'static str {
        "public_ip"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match ctx.fact(PUBLIC_IP_FACT) {
            Some(ip) => ResourceState::present_with(ip),
            None => ResourceState::Absent,
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let mut last_error = Error::system("no address lookup services configured");

        for url in &self.urls {
            match self.lookup(ctx, url) {
                Ok(ip) => {
                    log::debug!("Public address {ip} from {url}");
                    ctx.set_fact(PUBLIC_IP_FACT, ip.to_string());
                    return Ok(());
                }
                Err(err) => {
                    log::debug!("Address lookup via {url} failed: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use declarative::{Action, ErrorKind, Outcome};

    #[test]
    fn test_address_recorded_as_fact() {
        let host = FakeHost::ubuntu();
        let mut ctx = ApplyContext::new(&host);

        let result = Action::new("public-ip", PublicIp::new()).soft().run(&mut ctx);

        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.detail.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.fact(PUBLIC_IP_FACT), Some("203.0.113.7"));
    }

    #[test]
    fn test_falls_back_to_second_service() {
        let host = FakeHost::new().with_url("https://ifconfig.me/ip", "2001:db8::1");
        let mut ctx = ApplyContext::new(&host);

        let result = Action::new("public-ip", PublicIp::new()).soft().run(&mut ctx);

        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(ctx.fact(PUBLIC_IP_FACT), Some("2001:db8::1"));
        assert_eq!(host.fetches().len(), 2);
    }

    #[test]
    fn test_garbage_response_is_rejected() {
        let host = FakeHost::new()
            .with_url("https://api.ipify.org", "<html>rate limited</html>");
        let mut ctx = ApplyContext::new(&host);
        let lookup = PublicIp::with_urls(["https://api.ipify.org"]);

        let result = Action::new("public-ip", lookup).soft().run(&mut ctx);

        match result.outcome {
            Outcome::Failed { kind, reason } => {
                assert_eq!(kind, ErrorKind::SoftSystem);
                assert!(reason.contains("not an address"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(ctx.fact(PUBLIC_IP_FACT), None);
    }
}
