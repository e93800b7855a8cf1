//! Network identity rotation
//!
//! Every outbound request picks a user agent string from a weighted-random
//! [`UserAgentChooser`] and an egress proxy from a round-robin
//! [`ProxyChooser`]. Both choosers are `Send + Sync`; workers either share
//! one [`Identity`] through `Arc` or each take an [`Identity::isolated`] copy.

mod proxy;
mod user_agent;

pub use proxy::{ProxyChooser, ProxyOption};
pub use user_agent::{UserAgentChooser, UserAgentOption};

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a chooser
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChooserError {
    #[error("no options to choose from")]
    NoOptions,

    #[error("invalid weights: {0}")]
    InvalidWeights(String),
}

/// The rotators a worker draws its outbound identity from
///
/// Either rotator may be absent, in which case the fetcher falls back to its
/// default user agent or a direct connection.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_agents: Option<Arc<UserAgentChooser>>,
    pub proxies: Option<Arc<ProxyChooser>>,
}

impl Identity {
    /// Builds an identity from raw option lists; empty lists disable that rotator
    pub fn from_options(
        user_agents: Vec<UserAgentOption>,
        proxies: Vec<ProxyOption>,
    ) -> Result<Self, ChooserError> {
        let user_agents = if user_agents.is_empty() {
            None
        } else {
            Some(Arc::new(UserAgentChooser::new(user_agents)?))
        };
        let proxies = if proxies.is_empty() {
            None
        } else {
            Some(Arc::new(ProxyChooser::new(proxies)?))
        };
        Ok(Self {
            user_agents,
            proxies,
        })
    }

    /// Returns a copy with fresh rotation state over the same options
    pub fn isolated(&self) -> Result<Self, ChooserError> {
        let user_agents = match &self.user_agents {
            Some(chooser) => Some(Arc::new(UserAgentChooser::new(chooser.options().to_vec())?)),
            None => None,
        };
        let proxies = match &self.proxies {
            Some(chooser) => Some(Arc::new(ProxyChooser::new(chooser.options().to_vec())?)),
            None => None,
        };
        Ok(Self {
            user_agents,
            proxies,
        })
    }

    pub fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents.as_ref().map(|c| c.pick())
    }

    pub fn pick_proxy(&self) -> Option<&ProxyOption> {
        self.proxies.as_ref().map(|c| c.pick())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxies() -> Vec<ProxyOption> {
        vec![
            ProxyOption::parse("http://p1.local:8080").unwrap(),
            ProxyOption::parse("http://p2.local:8080").unwrap(),
        ]
    }

    #[test]
    fn test_empty_identity_picks_nothing() {
        let identity = Identity::default();
        assert!(identity.pick_user_agent().is_none());
        assert!(identity.pick_proxy().is_none());
    }

    #[test]
    fn test_from_options_skips_empty_lists() {
        let identity = Identity::from_options(Vec::new(), proxies()).unwrap();
        assert!(identity.user_agents.is_none());
        assert!(identity.proxies.is_some());
    }

    #[test]
    fn test_isolated_identity_has_independent_rotation() {
        let shared = Identity::from_options(
            vec![UserAgentOption::new("agent/1.0", 1)],
            proxies(),
        )
        .unwrap();

        // Advance the shared rotator once
        assert_eq!(shared.pick_proxy().unwrap().url.host_str(), Some("p1.local"));

        let isolated = shared.isolated().unwrap();
        assert_eq!(isolated.pick_proxy().unwrap().url.host_str(), Some("p1.local"));
        assert_eq!(shared.pick_proxy().unwrap().url.host_str(), Some("p2.local"));
        assert_eq!(isolated.pick_user_agent(), Some("agent/1.0"));
    }

    #[test]
    fn test_invalid_options_are_errors() {
        let result = Identity::from_options(vec![UserAgentOption::new("zero", 0)], Vec::new());
        assert!(matches!(result, Err(ChooserError::InvalidWeights(_))));
    }
}
