#![forbid(unsafe_code)]

use crate::error::ConfigError;
use crate::resolver::{DEFAULT_SHORTENERS, MatchMode, ShortenerSet};
use crate::sheets::{self, SheetsCredentials};
use crate::youtube::{self, DetailPart};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};
use tracing::warn;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CONFIG_PATH: &str = "channel-links.toml";
pub const DEFAULT_SNAPSHOT_DIR: &str = "data";
pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct Settings {
    pub youtube: YoutubeSettings,
    pub resolver: ResolverSettings,
    pub sheets: SheetsSettings,
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct YoutubeSettings {
    pub api_key: Option<String>,
    pub channel_id: Option<String>,
    pub page_size: Option<u32>,
    pub api_base: String,
    pub detail_parts: Vec<DetailPart>,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub shorteners: ShortenerSet,
    pub cache_redirects: bool,
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub spreadsheet_id: Option<String>,
    pub range: String,
    pub header: bool,
    pub api_base: String,
    pub token_url: String,
    pub credentials: Option<SheetsCredentials>,
}

impl YoutubeSettings {
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("YOUTUBE_API_KEY"))
    }

    pub fn require_channel_id(&self) -> Result<&str, ConfigError> {
        self.channel_id
            .as_deref()
            .ok_or(ConfigError::Missing("YOUTUBE_CHANNEL_ID"))
    }
}

impl SheetsSettings {
    pub fn require_spreadsheet_id(&self) -> Result<&str, ConfigError> {
        self.spreadsheet_id
            .as_deref()
            .ok_or(ConfigError::Missing("SHEETS_SPREADSHEET_ID"))
    }

    pub fn require_credentials(&self) -> Result<&SheetsCredentials, ConfigError> {
        self.credentials
            .as_ref()
            .ok_or(ConfigError::Missing("SHEETS_ACCESS_TOKEN or SHEETS_REFRESH_TOKEN"))
    }
}

/// Values given on the command line; they beat every other source.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub env_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
}

/// Shape of the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub snapshot_dir: Option<PathBuf>,
    pub youtube: FileYoutube,
    pub resolver: FileResolver,
    pub sheets: FileSheets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileYoutube {
    pub channel_id: Option<String>,
    pub page_size: Option<u32>,
    pub detail_parts: Option<Vec<DetailPart>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileResolver {
    pub shorteners: Option<Vec<String>>,
    #[serde(rename = "match")]
    pub match_mode: Option<MatchMode>,
    pub cache_redirects: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSheets {
    pub spreadsheet_id: Option<String>,
    pub range: Option<String>,
    pub header: Option<bool>,
}

/// Precedence, highest first: command-line overrides, process environment,
/// `.env` file, TOML config file, built-in defaults. Secrets are only read from
/// the environment or the `.env` file.
pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)
        .with_context(|| format!("Loading environment file {}", env_path.display()))?;

    let config_path = overrides.config_path.clone().or_else(|| {
        lookup_value("CHANNEL_LINKS_CONFIG", &file_vars, &env_var_string).map(PathBuf::from)
    });
    let file_config = match config_path {
        Some(path) => read_config_file(&path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_config_file(default)?
            } else {
                FileConfig::default()
            }
        }
    };

    Ok(build_settings(
        &file_vars,
        env_var_string,
        file_config,
        overrides,
    )?)
}

pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|err| ConfigError::File {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    toml::from_str(&raw).map_err(|err| ConfigError::File {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    file_config: FileConfig,
    overrides: SettingsOverrides,
) -> Result<Settings, ConfigError> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let page_size = match lookup("YOUTUBE_PAGE_SIZE") {
        Some(raw) if raw.eq_ignore_ascii_case("none") => None,
        Some(raw) => match raw.parse::<u32>() {
            Ok(size) => Some(size),
            Err(_) => {
                warn!(value = %raw, "ignoring invalid YOUTUBE_PAGE_SIZE");
                Some(file_config.youtube.page_size.unwrap_or(DEFAULT_PAGE_SIZE))
            }
        },
        None => Some(file_config.youtube.page_size.unwrap_or(DEFAULT_PAGE_SIZE)),
    };

    let detail_parts = match lookup("YOUTUBE_DETAIL_PARTS") {
        Some(raw) => parse_detail_parts(&raw)?,
        None => file_config
            .youtube
            .detail_parts
            .unwrap_or_else(|| DetailPart::DEFAULT.to_vec()),
    };

    let youtube = YoutubeSettings {
        api_key: lookup("YOUTUBE_API_KEY"),
        channel_id: lookup("YOUTUBE_CHANNEL_ID").or(file_config.youtube.channel_id),
        page_size,
        api_base: lookup("YOUTUBE_API_BASE")
            .unwrap_or_else(|| youtube::DEFAULT_API_BASE.to_string()),
        detail_parts,
    };

    let match_mode = match lookup("RESOLVER_MATCH") {
        Some(raw) => MatchMode::parse(&raw).ok_or_else(|| ConfigError::Invalid {
            key: "RESOLVER_MATCH",
            message: format!("expected `substring` or `suffix`, got `{raw}`"),
        })?,
        None => file_config.resolver.match_mode.unwrap_or_default(),
    };
    let shortener_hosts: Vec<String> = match lookup("RESOLVER_SHORTENERS") {
        Some(raw) => raw.split(',').map(str::to_owned).collect(),
        None => file_config.resolver.shorteners.unwrap_or_else(|| {
            DEFAULT_SHORTENERS
                .iter()
                .map(|host| host.to_string())
                .collect()
        }),
    };
    let cache_redirects = match lookup("RESOLVER_CACHE_REDIRECTS") {
        Some(raw) => parse_flag("RESOLVER_CACHE_REDIRECTS", &raw)?,
        None => file_config.resolver.cache_redirects.unwrap_or(false),
    };
    let resolver = ResolverSettings {
        shorteners: ShortenerSet::new(shortener_hosts, match_mode),
        cache_redirects,
    };

    let header = match lookup("SHEETS_HEADER") {
        Some(raw) => parse_flag("SHEETS_HEADER", &raw)?,
        None => file_config.sheets.header.unwrap_or(false),
    };
    let sheets = SheetsSettings {
        spreadsheet_id: lookup("SHEETS_SPREADSHEET_ID").or(file_config.sheets.spreadsheet_id),
        range: lookup("SHEETS_RANGE")
            .or(file_config.sheets.range)
            .unwrap_or_else(|| sheets::DEFAULT_RANGE.to_string()),
        header,
        api_base: lookup("SHEETS_API_BASE")
            .unwrap_or_else(|| sheets::DEFAULT_API_BASE.to_string()),
        token_url: lookup("SHEETS_TOKEN_URL")
            .unwrap_or_else(|| sheets::DEFAULT_TOKEN_URL.to_string()),
        credentials: sheets_credentials(&lookup)?,
    };

    let snapshot_dir = overrides
        .snapshot_dir
        .or_else(|| lookup("SNAPSHOT_DIR").map(PathBuf::from))
        .or(file_config.snapshot_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));

    Ok(Settings {
        youtube,
        resolver,
        sheets,
        snapshot_dir,
    })
}

/// A direct access token wins; otherwise all three refresh-token values must
/// be present together.
fn sheets_credentials(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<SheetsCredentials>, ConfigError> {
    if let Some(token) = lookup("SHEETS_ACCESS_TOKEN") {
        return Ok(Some(SheetsCredentials::AccessToken(token)));
    }

    let client_id = lookup("SHEETS_CLIENT_ID");
    let client_secret = lookup("SHEETS_CLIENT_SECRET");
    let refresh_token = lookup("SHEETS_REFRESH_TOKEN");
    match (client_id, client_secret, refresh_token) {
        (None, None, None) => Ok(None),
        (Some(client_id), Some(client_secret), Some(refresh_token)) => {
            Ok(Some(SheetsCredentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            }))
        }
        (None, _, _) => Err(ConfigError::Missing("SHEETS_CLIENT_ID")),
        (_, None, _) => Err(ConfigError::Missing("SHEETS_CLIENT_SECRET")),
        (_, _, None) => Err(ConfigError::Missing("SHEETS_REFRESH_TOKEN")),
    }
}

fn parse_detail_parts(raw: &str) -> Result<Vec<DetailPart>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            DetailPart::parse(part).ok_or_else(|| ConfigError::Invalid {
                key: "YOUTUBE_DETAIL_PARTS",
                message: format!("unknown part `{part}`"),
            })
        })
        .collect()
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got `{raw}`"),
        }),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

/// Reads `KEY=value` pairs from a dotenv-style file. A missing file is an empty
/// set of values; lines that are not assignments are skipped with a warning.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).map_err(|err| ConfigError::File {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let mut vars = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_assignment(line) {
            Some((key, value)) => {
                vars.insert(key.to_string(), value.to_string());
            }
            None => warn!(
                path = %path.display(),
                line = index + 1,
                "skipping line that is not a KEY=value assignment"
            ),
        }
    }
    Ok(vars)
}

fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|inner| inner.strip_suffix(*quote))
        })
        .unwrap_or(value)
}
