// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of log levels per trace target

use crate::LevelFilter;
use crate::targets::{TraceTarget, all_targets};
use arc_swap::ArcSwap;
use concurrency::sync::OnceLock;
use ordermap::OrderMap;
use std::str::FromStr;
// arc-swap stores and hands out std Arcs whatever the sync backend is
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Registry, fmt, reload};

/// Level used for events that do not belong to any declared target
pub const DEFAULT_DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

#[derive(Debug, thiserror::Error)]
pub enum TraceCtlError {
    #[error("Unknown trace target or tag '{0}'")]
    UnknownTarget(String),
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("Invalid tracing directive '{0}'")]
    InvalidDirective(String),
    #[error("Failed to apply tracing filter: {0}")]
    ReloadFailure(String),
    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

/// Snapshot of the configured levels
#[derive(Clone, Debug)]
pub(crate) struct TraceConfig {
    pub(crate) default: LevelFilter,
    pub(crate) levels: OrderMap<&'static str, LevelFilter>,
}

impl TraceConfig {
    fn from_targets() -> Self {
        let mut levels = OrderMap::new();
        for target in all_targets() {
            levels.entry(target.name).or_insert(target.default_level);
        }
        Self {
            default: DEFAULT_DEFAULT_LOGLEVEL,
            levels,
        }
    }

    fn to_filter(&self) -> Result<EnvFilter, TraceCtlError> {
        let mut filter = EnvFilter::default().add_directive(self.default.into());
        for target in all_targets() {
            let level = self
                .levels
                .get(target.name)
                .copied()
                .unwrap_or(target.default_level);
            let directive = format!("{}={level}", target.module);
            let directive = Directive::from_str(&directive)
                .map_err(|_| TraceCtlError::InvalidDirective(directive))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Object that owns the tracing filter of the process
pub struct TracingControl {
    config: ArcSwap<TraceConfig>,
    reload: reload::Handle<EnvFilter, Registry>,
}

fn parse_level(level: &str) -> Result<LevelFilter, TraceCtlError> {
    LevelFilter::from_str(level.trim()).map_err(|_| TraceCtlError::InvalidLevel(level.to_owned()))
}

impl TracingControl {
    fn init() -> Self {
        let config = TraceConfig::from_targets();
        let filter = config
            .to_filter()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(config.default.into()));
        let (layer, reload) = reload::Layer::new(filter);
        if let Err(e) = tracing_subscriber::registry()
            .with(layer)
            .with(fmt::layer().with_target(true))
            .try_init()
        {
            debug!("Not installing the tracing subscriber, levels will not be applied: {e}");
        }
        Self {
            config: ArcSwap::from_pointee(config),
            reload,
        }
    }

    fn apply(&self, update: impl Fn(&mut TraceConfig)) -> Result<(), TraceCtlError> {
        self.config.rcu(|current| {
            let mut config = TraceConfig::clone(current);
            update(&mut config);
            config
        });
        let filter = self.config.load().to_filter()?;
        self.reload
            .reload(filter)
            .map_err(|e| TraceCtlError::ReloadFailure(e.to_string()))
    }

    pub(crate) fn snapshot(&self) -> Arc<TraceConfig> {
        self.config.load_full()
    }

    /// Set the level of events that do not belong to any target
    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        self.apply(|config| config.default = level)
    }

    /// Set the level of a target, or of all the targets carrying a tag. Returns how many targets
    /// were changed.
    pub fn set_level(&self, name: &str, level: LevelFilter) -> Result<usize, TraceCtlError> {
        let matching: Vec<&'static str> = all_targets()
            .filter(|t| t.name == name || t.has_tag(name))
            .map(|t| t.name)
            .collect();
        if matching.is_empty() {
            return Err(TraceCtlError::UnknownTarget(name.to_owned()));
        }
        self.apply(|config| {
            for target in &matching {
                config.levels.insert(*target, level);
            }
        })?;
        Ok(matching.len())
    }

    /// Get the configured level of a target
    #[must_use]
    pub fn get_level(&self, name: &str) -> Option<LevelFilter> {
        self.config.load().levels.get(name).copied()
    }

    /// Get the level of events that do not belong to any target
    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.config.load().default
    }

    /// Configure levels from a string like `"rt-reclaim=debug,routing=info,warn"`. A bare level
    /// sets the default level. Nothing is applied if any item is invalid.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let mut items = vec![];
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item.split_once('=') {
                Some((name, level)) => {
                    let name = name.trim();
                    if !all_targets().any(|t| t.name == name || t.has_tag(name)) {
                        return Err(TraceCtlError::UnknownTarget(name.to_owned()));
                    }
                    items.push((Some(name), parse_level(level)?));
                }
                None => items.push((None, parse_level(item)?)),
            }
        }
        for (name, level) in items {
            match name {
                Some(name) => {
                    self.set_level(name, level)?;
                }
                None => self.set_default_level(level)?,
            }
        }
        Ok(())
    }

    /// All declared targets
    pub fn targets(&self) -> impl Iterator<Item = &'static TraceTarget> {
        all_targets()
    }
}

static TRACE_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the tracing control object, installing the global subscriber on first use.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACE_CTL.get_or_init(TracingControl::init)
}
