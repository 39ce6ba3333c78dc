//! Event dispatcher
//!
//! The host translates browser callbacks into [`Event`]s and carries out the
//! returned [`Effect`]s. The dispatcher reads and writes rules only through
//! [`RuleStore`], so its count updates share the store's serialization.
//!
//! # Redirect chains
//!
//! Each redirect appends the rule's normalized source to the target's
//! `url_redirector` parameter. When a navigation matches nothing, the chain
//! it carries is settled: every member rule not yet counted for that tab
//! gets exactly one increment. In navigation mode hops are counted as they
//! are issued; in declarative mode the browser redirects on its own and all
//! counting happens at the final destination.
//!
//! # Declarative table freshness
//!
//! The compiled table only changes when the dispatcher recompiles it, but
//! pauses and overrides end by the clock alone. A navigation that matches a
//! rule missing from the installed table means the table went stale: the
//! dispatcher recompiles and redirects that navigation itself. [`Event::Tick`]
//! refreshes the table without waiting for a navigation, and [`Dispatcher::run`]
//! delivers one when the next pause or override window closes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use ur_compiler::{compile_rules, DnrRule, DnrUpdate};
use ur_core::url::{parse_chain, with_chain};
use ur_core::{
    activated_rules, find_redirect, next_transition, should_rule_apply, NavigationEvent, OpenTab, RedirectMode, Rule,
    RuleSnapshot, ShufflePicker, TabRedirect,
};

use crate::error::StorageError;
use crate::ledger::ChainLedger;
use crate::store::{RuleSetChange, RuleStore};

// =============================================================================
// Events and effects
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A navigation is about to start
    Navigation(NavigationEvent),
    /// The stored rule set changed
    RulesChanged {
        old: Vec<Rule>,
        new: Vec<Rule>,
        open_tabs: Vec<OpenTab>,
    },
    /// A tab went away; its pending chain is dropped
    TabClosed { tab_id: i32 },
    /// The extension started with these declarative rule IDs installed
    Startup { installed_rule_ids: Vec<i32> },
    /// A request from the popup or options page
    Command(Command),
    /// A pause or override window may have closed
    Tick,
}

impl Event {
    pub fn rules_changed(change: RuleSetChange, open_tabs: Vec<OpenTab>) -> Self {
        Self::RulesChanged {
            old: change.old,
            new: change.new,
            open_tabs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddRule { source: String, target: String },
    UpdateRule(Rule),
    DeleteRule(i64),
    ToggleRule(i64),
    OverrideRule(i64),
}

/// Serialized as `{"type": "redirect", "payload": ...}` for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Effect {
    /// Send a tab somewhere else
    Redirect(TabRedirect),
    /// Apply this update to the declarative rule table
    InstallDeclarative(DnrUpdate),
    /// A rule was created
    RuleSaved(Rule),
}

/// The declarative table as last handed to the host.
#[derive(Default)]
struct Installed {
    rules: Vec<DnrRule>,
    sources: HashSet<String>,
}

/// Normalized sources a compile at `now` would include.
fn applicable_sources(rules: &[Rule], now: i64) -> HashSet<String> {
    rules
        .iter()
        .filter(|rule| should_rule_apply(rule, now))
        .map(Rule::normalized_source)
        .filter(|source| !source.is_empty())
        .collect()
}

/// A matched rule, detached from the rule list it came from.
struct Hit {
    rule_id: i64,
    source: String,
    target: String,
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct Dispatcher {
    store: Arc<RuleStore>,
    picker: Mutex<Box<dyn ShufflePicker + Send>>,
    ledger: ChainLedger,
    installed: Mutex<Installed>,
    last_change_at: Mutex<Option<i64>>,
}

impl Dispatcher {
    pub fn new(store: Arc<RuleStore>, picker: impl ShufflePicker + Send + 'static) -> Self {
        Self {
            store,
            picker: Mutex::new(Box::new(picker)),
            ledger: ChainLedger::new(),
            installed: Mutex::new(Installed::default()),
            last_change_at: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn ledger(&self) -> &ChainLedger {
        &self.ledger
    }

    fn mode(&self) -> RedirectMode {
        self.store.config().mode
    }

    /// Process one event.
    pub async fn handle(&self, event: Event) -> Result<Vec<Effect>, StorageError> {
        match event {
            Event::Navigation(nav) => self.on_navigation(nav).await,
            Event::RulesChanged { old, new, open_tabs } => self.on_rules_changed(old, new, open_tabs).await,
            Event::TabClosed { tab_id } => {
                self.ledger.take(tab_id);
                Ok(Vec::new())
            }
            Event::Startup { installed_rule_ids } => self.on_startup(installed_rule_ids).await,
            Event::Command(command) => self.on_command(command).await,
            Event::Tick => self.on_tick().await,
        }
    }

    /// When the installed table next goes stale, if ever. Always `None` in
    /// navigation mode.
    pub async fn next_deadline(&self) -> Result<Option<i64>, StorageError> {
        if self.mode() != RedirectMode::Declarative {
            return Ok(None);
        }
        let rules = self.store.get_rules().await?;
        Ok(next_transition(&rules, self.store.now_ms()))
    }

    /// Handle events until the channel closes, feeding in [`Event::Tick`]
    /// whenever a pause or override window closes. Failed events are logged
    /// and skipped; the loop ends early if nobody receives effects.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>, effects: mpsc::Sender<Effect>) {
        loop {
            let wait = match self.next_deadline().await {
                Ok(deadline) => deadline.map(|at| {
                    let remaining = at.saturating_sub(self.store.now_ms()).max(0);
                    Duration::from_millis(remaining as u64)
                }),
                Err(err) => {
                    log::warn!("could not read rule deadlines: {}", err);
                    None
                }
            };
            let next = match wait {
                Some(delay) => tokio::select! {
                    received = events.recv() => received,
                    _ = tokio::time::sleep(delay) => Some(Event::Tick),
                },
                None => events.recv().await,
            };
            let Some(event) = next else {
                return;
            };

            match self.handle(event).await {
                Ok(out) => {
                    for effect in out {
                        if effects.send(effect).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => log::warn!("event failed: {}", err),
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    async fn on_navigation(&self, nav: NavigationEvent) -> Result<Vec<Effect>, StorageError> {
        if !nav.is_main_frame() {
            return Ok(Vec::new());
        }

        let now = self.store.now_ms();
        let rules = self.store.get_rules().await?;

        if let Some(hit) = self.find_hit(&nav.url, &rules, now) {
            let mut effects = Vec::new();
            if self.mode() == RedirectMode::Declarative {
                let installed = self.installed.lock().sources.contains(&hit.source);
                if installed {
                    log::trace!("tab {}: hop at {} left to the declarative engine", nav.tab_id, nav.url);
                    return Ok(effects);
                }
                log::info!("rule {} applies but is not installed, recompiling", hit.rule_id);
                let update = self.recompile(&rules, now);
                if !update.is_empty() {
                    effects.push(Effect::InstallDeclarative(update));
                }
            }
            let redirect = self.redirect(nav.tab_id, parse_chain(&nav.url), hit).await?;
            effects.extend(redirect.map(Effect::Redirect));
            return Ok(effects);
        }

        self.settle_chain(nav.tab_id, &nav.url, &rules).await?;
        Ok(Vec::new())
    }

    fn find_hit(&self, url: &str, rules: &[Rule], now: i64) -> Option<Hit> {
        let mut picker = self.picker.lock();
        find_redirect(url, rules, now, &mut **picker).map(|found| Hit {
            rule_id: found.rule.id,
            source: found.rule.normalized_source(),
            target: found.target,
        })
    }

    /// Count the hop and build the tab update. `None` when the rule was
    /// deleted in the meantime.
    async fn redirect(&self, tab_id: i32, mut chain: Vec<String>, hit: Hit) -> Result<Option<TabRedirect>, StorageError> {
        let Some(count) = self.store.increment_count(hit.rule_id, 1, None).await? else {
            return Ok(None);
        };
        self.ledger.record(tab_id, hit.source.clone());

        if !chain.contains(&hit.source) {
            chain.push(hit.source);
        }
        log::debug!("tab {}: rule {} redirects to {}", tab_id, hit.rule_id, hit.target);

        Ok(Some(TabRedirect {
            tab_id,
            target_url: with_chain(&hit.target, &chain),
            rule_id: hit.rule_id,
            rule_count: count,
        }))
    }

    /// Credit each chain member once, skipping hops already counted.
    async fn settle_chain(&self, tab_id: i32, url: &str, rules: &[Rule]) -> Result<(), StorageError> {
        let counted = self.ledger.take(tab_id);
        let mut seen = HashSet::new();

        for member in parse_chain(url) {
            if counted.contains(&member) || !seen.insert(member.clone()) {
                continue;
            }
            match rules.iter().find(|rule| rule.normalized_source() == member) {
                Some(rule) => {
                    self.store.increment_count(rule.id, 1, None).await?;
                }
                None => log::debug!("chain member {} matches no rule", member),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Rule changes
    // =========================================================================

    async fn on_rules_changed(
        &self,
        old: Vec<Rule>,
        new: Vec<Rule>,
        open_tabs: Vec<OpenTab>,
    ) -> Result<Vec<Effect>, StorageError> {
        let now = self.store.now_ms();
        let since = self.last_change_at.lock().replace(now).unwrap_or(now);
        let mut effects = Vec::new();

        if self.mode() == RedirectMode::Declarative {
            let update = self.recompile(&new, now);
            if !update.is_empty() {
                effects.push(Effect::InstallDeclarative(update));
            }
        }

        let activated = activated_rules(RuleSnapshot::new(&old, since), RuleSnapshot::new(&new, now));
        if activated.is_empty() {
            return Ok(effects);
        }
        log::debug!("{} rules activated, scanning {} tabs", activated.len(), open_tabs.len());

        for tab in open_tabs {
            let Some(hit) = self.find_hit(&tab.url, &activated, now) else {
                continue;
            };
            if let Some(redirect) = self.redirect(tab.tab_id, parse_chain(&tab.url), hit).await? {
                effects.push(Effect::Redirect(redirect));
            }
        }
        Ok(effects)
    }

    /// Compile `rules` and diff against what was installed last.
    fn recompile(&self, rules: &[Rule], now: i64) -> DnrUpdate {
        let compiled = {
            let mut picker = self.picker.lock();
            compile_rules(rules, now, &mut **picker)
        };
        let mut installed = self.installed.lock();
        let update = DnrUpdate::diff(&installed.rules, &compiled);
        *installed = Installed {
            rules: compiled,
            sources: applicable_sources(rules, now),
        };
        update
    }

    /// Recompile when the set of applicable rules no longer matches the
    /// installed table. Shuffle targets are only re-picked then.
    async fn on_tick(&self) -> Result<Vec<Effect>, StorageError> {
        if self.mode() != RedirectMode::Declarative {
            return Ok(Vec::new());
        }
        let rules = self.store.get_rules().await?;
        let now = self.store.now_ms();
        let current = applicable_sources(&rules, now) == self.installed.lock().sources;
        if current {
            return Ok(Vec::new());
        }

        log::debug!("pause or override window closed, recompiling");
        let update = self.recompile(&rules, now);
        Ok(if update.is_empty() {
            Vec::new()
        } else {
            vec![Effect::InstallDeclarative(update)]
        })
    }

    async fn on_startup(&self, installed_rule_ids: Vec<i32>) -> Result<Vec<Effect>, StorageError> {
        let (compiled, sources) = match self.mode() {
            RedirectMode::Declarative => {
                let rules = self.store.get_rules().await?;
                let now = self.store.now_ms();
                let mut picker = self.picker.lock();
                (compile_rules(&rules, now, &mut **picker), applicable_sources(&rules, now))
            }
            RedirectMode::Navigation => (Vec::new(), HashSet::new()),
        };

        *self.installed.lock() = Installed {
            rules: compiled.clone(),
            sources,
        };
        let update = DnrUpdate::replace_all(&installed_rule_ids, compiled);
        log::info!(
            "startup: removing {} and installing {} declarative rules",
            update.remove_rule_ids.len(),
            update.add_rules.len()
        );

        if update.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![Effect::InstallDeclarative(update)])
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn on_command(&self, command: Command) -> Result<Vec<Effect>, StorageError> {
        match command {
            Command::AddRule { source, target } => {
                let rule = Rule::new(self.store.now_ms(), source, target);
                let saved = self.store.add_rule(rule).await?;
                return Ok(vec![Effect::RuleSaved(saved)]);
            }
            Command::UpdateRule(rule) => {
                self.store.update_rule(rule).await?;
            }
            Command::DeleteRule(id) => {
                self.store.delete_rule(id).await?;
            }
            Command::ToggleRule(id) => {
                self.store.toggle_rule(id).await?;
            }
            Command::OverrideRule(id) => {
                self.store.override_rule(id).await?;
            }
        }
        Ok(Vec::new())
    }
}
