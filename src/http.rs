#![forbid(unsafe_code)]

use ureq::{Agent, AgentBuilder};

pub const USER_AGENT: &str = concat!("channel-links/", env!("CARGO_PKG_VERSION"));
pub const MAX_REDIRECTS: u32 = 10;

/// Builds the agent used by every collaborator. No timeouts are configured:
/// a hung request stalls the batch until the operator interrupts it.
pub fn build_agent() -> Agent {
    AgentBuilder::new()
        .user_agent(USER_AGENT)
        .redirects(MAX_REDIRECTS)
        .build()
}
