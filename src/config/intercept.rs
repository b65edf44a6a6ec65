//! `[intercept]`, `[routing]` and `[rewrite]` sections of pgswitch.toml.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

use super::pools::PoolsConfig;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

// Tag + length + terminator.
const MIN_BUFFER_CAPACITY: usize = 6;

// -----------------------------------------------------------------------------
// ----- FailurePolicy ---------------------------------------------------------

/// What a session does when a statement cannot be intercepted: the buffer
/// overflowed, the rewrite did not fit, or a decision call failed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Forward the original statement, unrouted and unmodified.
    #[default]
    PassThrough,
    /// Terminate the client session.
    Disconnect,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::PassThrough => "pass_through",
            FailurePolicy::Disconnect => "disconnect",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- InterceptConfig -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InterceptConfig {
    pub buffer_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub decision_timeout: Option<Duration>,
    pub routing: Option<RoutingSpec>,
    pub rewrite: Option<RewriteSpec>,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            failure_policy: FailurePolicy::PassThrough,
            decision_timeout: None,
            routing: None,
            rewrite: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RoutingSpec {
    Rules(Vec<RouteRuleSpec>),
    Command(CommandSpec),
}

#[derive(Debug, Clone)]
pub enum RewriteSpec {
    Rules(Vec<RewriteRuleSpec>),
    Command(CommandSpec),
}

#[derive(Debug, Clone)]
pub struct RouteRuleSpec {
    pub pattern: Regex,
    pub dbkey: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RewriteRuleSpec {
    pub pattern: Regex,
    pub replacement: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

// -----------------------------------------------------------------------------
// ----- InterceptConfig: Static -----------------------------------------------

impl InterceptConfig {
    pub(crate) fn from_sections(
        intercept: InterceptFileSection,
        routing: CapabilityFileSection<RouteRuleEntry>,
        rewrite: CapabilityFileSection<RewriteRuleEntry>,
        pools: &PoolsConfig,
    ) -> Result<Self, InterceptConfigError> {
        let buffer_capacity = intercept.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY);
        if buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(InterceptConfigError::BufferTooSmall(buffer_capacity));
        }

        let decision_timeout = intercept
            .decision_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw).map_err(|e| InterceptConfigError::InvalidTimeout {
                    raw: raw.to_string(),
                    source: e,
                })
            })
            .transpose()?;

        let routing = build_routing(routing, pools)?;
        let rewrite = build_rewrite(rewrite)?;

        Ok(Self {
            buffer_capacity,
            failure_policy: intercept.failure_policy,
            decision_timeout,
            routing,
            rewrite,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- InterceptConfig: Public -----------------------------------------------

impl InterceptConfig {
    pub fn routing_enabled(&self) -> bool {
        self.routing.is_some()
    }

    pub fn rewrite_enabled(&self) -> bool {
        self.rewrite.is_some()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InterceptFileSection {
    #[serde(default)]
    buffer_capacity: Option<usize>,

    #[serde(default)]
    failure_policy: FailurePolicy,

    // humantime, e.g. "250ms" or "2s"
    #[serde(default)]
    decision_timeout: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CapabilityKind {
    #[default]
    Rules,
    Command,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub(crate) struct CapabilityFileSection<R> {
    #[serde(default)]
    enabled: bool,

    #[serde(default)]
    kind: CapabilityKind,

    #[serde(default = "Vec::new")]
    rules: Vec<R>,

    // argv; the first element is the program
    #[serde(default)]
    command: Vec<String>,
}

impl<R> Default for CapabilityFileSection<R> {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: CapabilityKind::Rules,
            rules: Vec::new(),
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RouteRuleEntry {
    pattern: String,
    dbkey: String,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    case_insensitive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RewriteRuleEntry {
    pattern: String,
    replacement: String,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    case_insensitive: bool,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn build_routing(
    section: CapabilityFileSection<RouteRuleEntry>,
    pools: &PoolsConfig,
) -> Result<Option<RoutingSpec>, InterceptConfigError> {
    if !section.enabled {
        return Ok(None);
    }

    match section.kind {
        CapabilityKind::Command => Ok(Some(RoutingSpec::Command(build_command(
            "routing",
            section.command,
        )?))),
        CapabilityKind::Rules => {
            if section.rules.is_empty() {
                return Err(InterceptConfigError::NoRules("routing"));
            }

            let mut rules = Vec::with_capacity(section.rules.len());
            for entry in section.rules {
                if !pools.contains(&entry.dbkey) {
                    return Err(InterceptConfigError::UnknownRouteTarget { dbkey: entry.dbkey });
                }

                rules.push(RouteRuleSpec {
                    pattern: compile(&entry.pattern, entry.case_insensitive)?,
                    dbkey: entry.dbkey,
                    users: entry.users,
                });
            }

            Ok(Some(RoutingSpec::Rules(rules)))
        }
    }
}

fn build_rewrite(
    section: CapabilityFileSection<RewriteRuleEntry>,
) -> Result<Option<RewriteSpec>, InterceptConfigError> {
    if !section.enabled {
        return Ok(None);
    }

    match section.kind {
        CapabilityKind::Command => Ok(Some(RewriteSpec::Command(build_command(
            "rewrite",
            section.command,
        )?))),
        CapabilityKind::Rules => {
            if section.rules.is_empty() {
                return Err(InterceptConfigError::NoRules("rewrite"));
            }

            let rules = section
                .rules
                .into_iter()
                .map(|entry| {
                    Ok(RewriteRuleSpec {
                        pattern: compile(&entry.pattern, entry.case_insensitive)?,
                        replacement: entry.replacement,
                        users: entry.users,
                    })
                })
                .collect::<Result<Vec<_>, InterceptConfigError>>()?;

            Ok(Some(RewriteSpec::Rules(rules)))
        }
    }
}

fn build_command(
    capability: &'static str,
    mut argv: Vec<String>,
) -> Result<CommandSpec, InterceptConfigError> {
    if argv.is_empty() || argv[0].trim().is_empty() {
        return Err(InterceptConfigError::NoCommand(capability));
    }

    let program = PathBuf::from(argv.remove(0));
    Ok(CommandSpec {
        program,
        args: argv,
    })
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, InterceptConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| InterceptConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum InterceptConfigError {
    #[error("buffer_capacity {0} is too small to hold any statement")]
    BufferTooSmall(usize),

    #[error("invalid decision_timeout '{raw}': {source}")]
    InvalidTimeout {
        raw: String,
        source: humantime::DurationError,
    },

    #[error("[{0}] is enabled with kind = \"rules\" but has no rules")]
    NoRules(&'static str),

    #[error("[{0}] is enabled with kind = \"command\" but has no command")]
    NoCommand(&'static str),

    #[error("routing rule targets unknown dbkey '{dbkey}'")]
    UnknownRouteTarget { dbkey: String },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}
