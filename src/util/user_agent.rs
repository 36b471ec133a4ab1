use rand::seq::IndexedRandom;
use std::sync::Arc;

/// Fallback when the configured pool is empty.
const DEFAULT_USER_AGENT: &str = concat!("infobroker/", env!("CARGO_PKG_VERSION"));

/// Rotation pool of `User-Agent` strings. Each request draws one at random.
///
/// Clone is cheap: the pool is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Arc<[String]>,
}

impl UserAgentPool {
    pub fn new(agents: &[String]) -> Self {
        let agents: Vec<String> = agents
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if agents.is_empty() {
            tracing::warn!("User agent pool is empty, using built-in default");
        }
        Self {
            agents: agents.into(),
        }
    }

    pub fn pick(&self) -> &str {
        self.agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}
