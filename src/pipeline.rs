#![forbid(unsafe_code)]

//! Stage orchestration. Each stage consumes the full output of the previous
//! one, writes its own snapshot, and hands its records on in memory. A stage
//! whose input was not produced earlier in the same run reads the previous
//! snapshot from disk instead.

use crate::config::Settings;
use crate::error::ConfigError;
use crate::http;
use crate::links;
use crate::models::{ContentItem, EnrichedLinkRecord, LinkRecord};
use crate::resolver::{DomainResolver, RedirectFollower, UreqRedirectFollower};
use crate::sheets::{self, SheetTarget, SheetsApi, UreqSheetsClient};
use crate::snapshot::{SnapshotPaths, read_snapshot, write_snapshot};
use crate::youtube::{self, UreqYoutubeApi, YoutubeApi};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::collections::BTreeSet;
use tracing::info;
use ureq::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Stage {
    /// List the channel and fetch video details.
    Videos,
    /// Extract links from video descriptions.
    Links,
    /// Resolve every link to its destination domain.
    Domains,
    /// Write the rows to the spreadsheet.
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Videos, Stage::Links, Stage::Domains, Stage::Publish];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Videos => "videos",
            Self::Links => "links",
            Self::Domains => "domains",
            Self::Publish => "publish",
        }
    }
}

/// Canonical execution order of the requested stages; nothing requested
/// means everything.
pub fn plan(requested: &[Stage]) -> Vec<Stage> {
    if requested.is_empty() {
        return Stage::ALL.to_vec();
    }
    requested
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Checks every setting the planned stages need before any work starts.
pub fn validate(stages: &[Stage], settings: &Settings) -> Result<(), ConfigError> {
    for stage in stages {
        match stage {
            Stage::Videos => {
                settings.youtube.require_api_key()?;
                settings.youtube.require_channel_id()?;
            }
            Stage::Publish => {
                settings.sheets.require_spreadsheet_id()?;
                settings.sheets.require_credentials()?;
            }
            Stage::Links | Stage::Domains => {}
        }
    }
    Ok(())
}

/// Builds the network collaborators for the stages that need them.
pub trait Services {
    type Youtube: YoutubeApi;
    type Follower: RedirectFollower;
    type Sheets: SheetsApi;

    fn youtube(&self, settings: &Settings) -> Result<Self::Youtube>;
    fn follower(&self, settings: &Settings) -> Self::Follower;
    fn sheets(&self, settings: &Settings) -> Result<Self::Sheets>;
}

/// Real HTTP collaborators sharing one `ureq` agent.
pub struct LiveServices {
    agent: Agent,
}

impl LiveServices {
    pub fn new() -> Self {
        Self {
            agent: http::build_agent(),
        }
    }
}

impl Default for LiveServices {
    fn default() -> Self {
        Self::new()
    }
}

impl Services for LiveServices {
    type Youtube = UreqYoutubeApi;
    type Follower = UreqRedirectFollower;
    type Sheets = UreqSheetsClient;

    fn youtube(&self, settings: &Settings) -> Result<Self::Youtube> {
        let api_key = settings.youtube.require_api_key()?;
        Ok(UreqYoutubeApi::new(
            self.agent.clone(),
            &settings.youtube.api_base,
            api_key,
        ))
    }

    fn follower(&self, _settings: &Settings) -> Self::Follower {
        UreqRedirectFollower::new(self.agent.clone())
    }

    fn sheets(&self, settings: &Settings) -> Result<Self::Sheets> {
        let credentials = settings.sheets.require_credentials()?;
        let token = sheets::obtain_access_token(
            &self.agent,
            &settings.sheets.token_url,
            credentials,
        )
        .context("obtaining a Sheets access token")?;
        Ok(UreqSheetsClient::new(
            self.agent.clone(),
            &settings.sheets.api_base,
            token,
        ))
    }
}

/// What each executed stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub videos: Option<usize>,
    pub links: Option<usize>,
    pub domains: Option<usize>,
    pub rows_written: Option<u64>,
}

/// Runs the requested stages in canonical order. `progress` receives
/// `(stage, done, total)` after each unit of per-record work.
pub fn run<S: Services>(
    requested: &[Stage],
    settings: &Settings,
    services: &S,
    mut progress: impl FnMut(Stage, usize, usize),
) -> Result<RunSummary> {
    let stages = plan(requested);
    validate(&stages, settings)?;

    let paths = SnapshotPaths::in_dir(&settings.snapshot_dir);
    let mut summary = RunSummary::default();
    let mut videos: Option<Vec<ContentItem>> = None;
    let mut link_records: Option<Vec<LinkRecord>> = None;
    let mut enriched: Option<Vec<EnrichedLinkRecord>> = None;

    for stage in stages {
        info!(stage = stage.as_str(), "stage started");
        match stage {
            Stage::Videos => {
                let api = services.youtube(settings)?;
                let channel_id = settings.youtube.require_channel_id()?;
                let items = youtube::collect_videos(
                    &api,
                    channel_id,
                    settings.youtube.page_size,
                    &settings.youtube.detail_parts,
                    |done, total| progress(stage, done, total),
                )
                .with_context(|| format!("collecting videos of channel {channel_id}"))?;
                write_snapshot(&paths.videos, &items)?;
                summary.videos = Some(items.len());
                videos = Some(items);
            }
            Stage::Links => {
                let items = match videos.take() {
                    Some(items) => items,
                    None => read_snapshot(&paths.videos)?,
                };
                let records = links::extract_links(&items);
                write_snapshot(&paths.links, &records)?;
                summary.links = Some(records.len());
                link_records = Some(records);
            }
            Stage::Domains => {
                let records = match link_records.take() {
                    Some(records) => records,
                    None => read_snapshot(&paths.links)?,
                };
                let mut resolver = DomainResolver::new(
                    settings.resolver.shorteners.clone(),
                    services.follower(settings),
                );
                if settings.resolver.cache_redirects {
                    resolver = resolver.with_redirect_cache();
                }
                let resolved =
                    resolver.enrich_all(records, |done, total| progress(stage, done, total));
                write_snapshot(&paths.enriched, &resolved)?;
                summary.domains = Some(resolved.len());
                enriched = Some(resolved);
            }
            Stage::Publish => {
                let records = match enriched.take() {
                    Some(records) => records,
                    None => read_snapshot(&paths.enriched)?,
                };
                let api = services.sheets(settings)?;
                let target = SheetTarget {
                    spreadsheet_id: settings.sheets.require_spreadsheet_id()?.to_string(),
                    range: settings.sheets.range.clone(),
                };
                let rows = sheets::build_rows(&records, settings.sheets.header);
                let written = sheets::publish(&api, &target, &rows)
                    .with_context(|| format!("publishing {} rows", rows.len()))?;
                summary.rows_written = Some(written.updated_rows);
            }
        }
        info!(stage = stage.as_str(), "stage finished");
    }

    Ok(summary)
}
