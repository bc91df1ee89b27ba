//! Pause gate
//!
//! When trading is administratively paused the dashboard must keep showing
//! the figures from before the pause instead of windows that silently slide
//! forward. The last rendered statistics therefore live in the ledger file
//! (`RenderState`) and are handed back verbatim while the pause lasts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::stats::ComputedStats;

pub const DEFAULT_PAUSE_MESSAGE: &str = "Trading is currently paused.";

/// External pause input (`trade_active` / `trade_pause_message`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PauseState {
    pub paused: bool,
    pub message: Option<String>,
}

impl PauseState {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn paused(message: impl Into<String>) -> Self {
        Self {
            paused: true,
            message: Some(message.into()),
        }
    }

    /// Build from the config pair, where `trade_active = false` means paused.
    pub fn from_flags(trade_active: bool, message: Option<String>) -> Self {
        Self {
            paused: !trade_active,
            message,
        }
    }

    fn banner_text(&self) -> String {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_PAUSE_MESSAGE)
            .to_string()
    }
}

/// Rendering memory persisted alongside the ledger
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderState {
    #[serde(default)]
    pub last_rendered: Option<ComputedStats>,
    #[serde(default)]
    pub paused_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseBanner {
    pub message: String,
    pub since: DateTime<Utc>,
}

/// Statistics ready for the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableStats {
    pub stats: ComputedStats,
    pub banner: Option<PauseBanner>,
    /// True when `stats` came from `RenderState` rather than this run
    pub frozen: bool,
}

pub struct PauseGate;

impl PauseGate {
    /// Decide which statistics to render. `compute` is only called when the
    /// figures are not frozen.
    pub fn apply<F>(
        pause: &PauseState,
        memory: &mut RenderState,
        now: DateTime<Utc>,
        compute: F,
    ) -> RenderableStats
    where
        F: FnOnce() -> ComputedStats,
    {
        if !pause.paused {
            if memory.paused_since.take().is_some() {
                info!("Trading resumed, statistics recomputed");
            }
            let stats = compute();
            memory.last_rendered = Some(stats.clone());
            return RenderableStats {
                stats,
                banner: None,
                frozen: false,
            };
        }

        let since = *memory.paused_since.get_or_insert(now);
        let banner = PauseBanner {
            message: pause.banner_text(),
            since,
        };

        match &memory.last_rendered {
            Some(previous) => {
                debug!(
                    "Paused since {}, rendering statistics computed at {}",
                    since, previous.computed_at
                );
                RenderableStats {
                    stats: previous.clone(),
                    banner: Some(banner),
                    frozen: true,
                }
            }
            None => {
                // Nothing rendered before the pause: freeze this first computation
                info!("Paused before any statistics were rendered, freezing current figures");
                let stats = compute();
                memory.last_rendered = Some(stats.clone());
                RenderableStats {
                    stats,
                    banner: Some(banner),
                    frozen: false,
                }
            }
        }
    }
}
