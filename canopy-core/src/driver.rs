//! Fixed-Step Driver
//!
//! The only clock in the system. On every tick the driver commits pending
//! structural edits, fans the update (and optional render) event down the
//! tree, then settles any disposals the commit triggered.
//!
//! Interactive hosts drive ticks from their own frame callback by calling
//! [`FixedStepDriver::tick`] directly; headless hosts use [`FixedStepDriver::run`].

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::DriverConfig;
use crate::error::CascadeFailure;
use crate::graph::Event;
use crate::tree::{EffectNode, EffectTree};

/// Outcome of [`FixedStepDriver::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverReport {
    pub ticks: u64,
}

/// Emits synthetic tick events through an effect tree.
#[derive(Debug)]
pub struct FixedStepDriver {
    tree: EffectTree,
    config: DriverConfig,
    ticks: u64,
    last_tick: Option<Instant>,
}

impl FixedStepDriver {
    pub fn new(tree: EffectTree, config: DriverConfig) -> Self {
        Self {
            tree,
            config,
            ticks: 0,
            last_tick: None,
        }
    }

    pub fn tree(&self) -> &EffectTree {
        &self.tree
    }

    /// Ticks performed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick on a fixed interval until `max_ticks` is reached or the root is
    /// no longer alive.
    pub async fn run(&mut self) -> Result<DriverReport, CascadeFailure> {
        let mut interval = time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.config.max_ticks.is_some_and(|max| self.ticks >= max) {
                break;
            }
            if !self.tree.is_alive() {
                debug!(ticks = self.ticks, "root disposed, driver stopping");
                break;
            }
            interval.tick().await;
            self.tick().await?;
        }

        Ok(DriverReport { ticks: self.ticks })
    }

    /// Perform a single step and return the tick event as it came back from
    /// the tree.
    pub async fn tick(&mut self) -> Result<Event, CascadeFailure> {
        let now = Instant::now();
        let dt_ms = match self.last_tick.replace(now) {
            Some(previous) => {
                u64::try_from(now.duration_since(previous).as_millis()).unwrap_or(u64::MAX)
            }
            None => self.config.tick_interval_ms,
        };

        let summary = self.tree.commit();

        let mut event = Event::new()
            .with("tick", self.ticks)
            .with("dt_ms", dt_ms);
        let global_fields: Vec<&str> = self.config.global_fields.iter().map(String::as_str).collect();

        self.tree
            .emit(&self.config.update_event, &mut event, &global_fields);
        if let Some(render) = &self.config.render_event {
            self.tree.emit(render, &mut event, &global_fields);
        }

        self.tree.settle().await?;
        self.ticks += 1;

        debug!(tick = self.ticks, dt_ms, disposals = summary.disposals, "tick");
        Ok(event)
    }
}
