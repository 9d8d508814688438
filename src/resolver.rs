#![forbid(unsafe_code)]

//! Only links on a known shortener touch the network. An unreachable
//! shortener resolves to its own host.

use crate::error::FollowError;
use crate::models::{EnrichedLinkRecord, LinkRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, warn};
use ureq::Agent;

/// Hosts treated as redirect-only services unless configured otherwise. Very
/// short names such as `t.co` or `t.ly` are left out since they occur inside
/// ordinary hostnames.
pub const DEFAULT_SHORTENERS: &[&str] = &[
    "bit.ly",
    "goo.gl",
    "tinyurl.com",
    "is.gd",
    "buff.ly",
    "cutt.ly",
    "rebrand.ly",
    "clck.ru",
    "shorturl.at",
    "tiny.cc",
    "amzn.to",
    "youtu.be",
];

/// Host between `//` and the next `/`, `?` or `#`, minus a leading `www.`.
static HOST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//(?:www\.)?([^/?#]+)").expect("host pattern compiles"));

/// Returns the host part of `target`, or `None` when nothing follows a `//`.
/// The first match wins.
pub fn extract_domain(target: &str) -> Option<&str> {
    HOST_PATTERN
        .captures(target)
        .and_then(|captures| captures.get(1))
        .map(|host| host.as_str())
}

/// How a link's host is compared against the shortener list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The host contains an entry anywhere. Cheap but can misfire, e.g. an
    /// unrelated `notbit.lying.example` host matches `bit.ly`.
    #[default]
    #[serde(alias = "contains")]
    Substring,
    /// The host equals an entry or is a subdomain of it.
    #[serde(alias = "domain")]
    Suffix,
}

impl MatchMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "substring" | "contains" => Some(Self::Substring),
            "suffix" | "domain" => Some(Self::Suffix),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenerSet {
    hosts: Vec<String>,
    mode: MatchMode,
}

impl Default for ShortenerSet {
    fn default() -> Self {
        Self::new(DEFAULT_SHORTENERS.iter().copied(), MatchMode::default())
    }
}

impl ShortenerSet {
    pub fn new<I, S>(hosts: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts, mode }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|entry| match self.mode {
            MatchMode::Substring => host.contains(entry.as_str()),
            MatchMode::Suffix => {
                host == *entry
                    || host
                        .strip_suffix(entry.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
        })
    }
}

/// Follows a link's redirect chain and reports where it ends.
pub trait RedirectFollower {
    fn final_url(&self, link: &str) -> Result<String, FollowError>;
}

/// [`RedirectFollower`] doing a GET with `ureq`'s redirect handling.
pub struct UreqRedirectFollower {
    agent: Agent,
}

impl UreqRedirectFollower {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

impl RedirectFollower for UreqRedirectFollower {
    fn final_url(&self, link: &str) -> Result<String, FollowError> {
        match self.agent.get(link).call() {
            Ok(response) => Ok(response.get_url().to_string()),
            // The chain was followed; the landing page just answered badly.
            Err(ureq::Error::Status(status, response)) => {
                debug!(link, status, "redirect target answered with error status");
                Ok(response.get_url().to_string())
            }
            Err(err) => Err(FollowError::Connection {
                link: link.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Turns raw links into domains, consulting the follower only for shortener
/// hosts.
pub struct DomainResolver<F> {
    shorteners: ShortenerSet,
    follower: F,
    cache: Option<RefCell<HashMap<String, String>>>,
}

impl<F: RedirectFollower> DomainResolver<F> {
    pub fn new(shorteners: ShortenerSet, follower: F) -> Self {
        Self {
            shorteners,
            follower,
            cache: None,
        }
    }

    /// Shares one network resolution between identical shortener links for
    /// the lifetime of this resolver.
    pub fn with_redirect_cache(mut self) -> Self {
        self.cache = Some(RefCell::new(HashMap::new()));
        self
    }

    pub fn is_shortened(&self, link: &str) -> bool {
        extract_domain(link).is_some_and(|host| self.shorteners.matches(host))
    }

    /// Resolves `link` to its domain. Never fails: a connection error falls
    /// back to the unresolved link and an unparseable target yields the link
    /// text itself.
    pub fn resolve(&self, link: &str) -> String {
        let target = if self.is_shortened(link) {
            self.follow(link)
        } else {
            link.to_string()
        };

        match extract_domain(&target) {
            Some(domain) => domain.to_string(),
            None => {
                warn!(link, %target, "no host found in resolution target");
                link.to_string()
            }
        }
    }

    fn follow(&self, link: &str) -> String {
        if let Some(cache) = &self.cache {
            let hit = cache.borrow().get(link).cloned();
            if let Some(hit) = hit {
                debug!(link, target = %hit, "redirect cache hit");
                return hit;
            }
        }

        let target = match self.follower.final_url(link) {
            Ok(target) => {
                debug!(link, %target, "shortened link resolved");
                target
            }
            Err(err) => {
                warn!(link, %err, "could not resolve shortened link; using it unresolved");
                link.to_string()
            }
        };

        if let Some(cache) = &self.cache {
            cache.borrow_mut().insert(link.to_string(), target.clone());
        }
        target
    }

    pub fn enrich(&self, record: LinkRecord) -> EnrichedLinkRecord {
        let domain = self.resolve(&record.link);
        EnrichedLinkRecord { record, domain }
    }

    /// Enriches records one after another, calling `progress(done, total)`
    /// after each.
    pub fn enrich_all(
        &self,
        records: Vec<LinkRecord>,
        mut progress: impl FnMut(usize, usize),
    ) -> Vec<EnrichedLinkRecord> {
        let total = records.len();
        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let enriched = self.enrich(record);
                progress(index + 1, total);
                enriched
            })
            .collect()
    }
}
