use std::collections::{HashMap, HashSet};

use ur_core::antidote::ShufflePicker;
use ur_core::hash::{descriptor_id, probe_id};
use ur_core::matcher::resolve_target;
use ur_core::state::should_rule_apply;
use ur_core::url::{encode_chain_member, CHAIN_PARAM, CHAIN_SEPARATOR};
use ur_core::Rule;

use crate::dnr::DnrRule;

/// Priority of the rule that extends an existing chain parameter.
pub const PRESERVE_PRIORITY: u32 = 2;
/// Priority of the rule that starts a new chain.
pub const START_PRIORITY: u32 = 1;

const PRESERVE_SALT: &str = "preserve";
const START_SALT: &str = "start";

const URL_PREFIX: &str = r"^https?://(?:www\.)?";

/// Compile the rules that apply at `now` into declarative redirects.
///
/// Paused rules and rules inside a manual override window are left out;
/// the caller recompiles once those windows close.
///
/// Each rule yields a preserve descriptor (priority 2) for requests that
/// already carry the chain parameter, followed by a start descriptor
/// (priority 1) for everything else. IDs depend only on the normalized
/// sources in the list, never on list order or on `now`.
///
/// Shuffle targets are resolved here through `picker`, so compiling a
/// shuffle rule twice is only deterministic when the picker is.
pub fn compile_rules(rules: &[Rule], now: i64, picker: &mut dyn ShufflePicker) -> Vec<DnrRule> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut compiled: Vec<CompiledSource> = Vec::new();

    for rule in rules {
        if !should_rule_apply(rule, now) {
            continue;
        }
        let source = rule.normalized_source();
        if source.is_empty() {
            log::warn!("rule {} has an empty source, skipping", rule.id);
            continue;
        }
        if !seen.insert(source.clone()) {
            log::warn!("rule {} duplicates source {}, skipping", rule.id, source);
            continue;
        }

        let target = resolve_target(rule, picker);
        compiled.push(CompiledSource { source, target });
    }

    let ids = assign_ids(&compiled);

    let mut out = Vec::with_capacity(compiled.len() * 2);
    for entry in &compiled {
        let pattern = regex::escape(&entry.source);
        let member = escape_substitution(&encode_chain_member(&entry.source));

        out.push(DnrRule::redirect(
            ids[&(entry.source.as_str(), PRESERVE_SALT)],
            PRESERVE_PRIORITY,
            format!(r"{}{}.*[?&]{}=([^&#]*)", URL_PREFIX, pattern, CHAIN_PARAM),
            substitution(&entry.target, &format!(r"\1{}{}", CHAIN_SEPARATOR, member)),
        ));
        out.push(DnrRule::redirect(
            ids[&(entry.source.as_str(), START_SALT)],
            START_PRIORITY,
            format!("{}{}", URL_PREFIX, pattern),
            substitution(&entry.target, &member),
        ));
    }

    log::debug!("compiled {} rules into {} declarative rules", compiled.len(), out.len());
    out
}

struct CompiledSource {
    source: String,
    target: String,
}

/// Hash every descriptor key, probing past IDs already handed out.
///
/// Keys are visited in sorted order so the outcome of a probe does not
/// depend on rule order.
fn assign_ids(compiled: &[CompiledSource]) -> HashMap<(&str, &'static str), i32> {
    let mut keys: Vec<(&str, &'static str)> = compiled
        .iter()
        .flat_map(|entry| [(entry.source.as_str(), PRESERVE_SALT), (entry.source.as_str(), START_SALT)])
        .collect();
    keys.sort_unstable();

    let mut used: HashSet<i32> = HashSet::with_capacity(keys.len());
    let mut ids = HashMap::with_capacity(keys.len());

    for key in keys {
        let (source, salt) = key;
        let mut id = descriptor_id(source, salt);
        let mut attempt = 1;
        while !used.insert(id) {
            log::warn!("declarative rule id {} for {}|{} already taken, probing", id, source, salt);
            id = probe_id(source, salt, attempt);
            attempt += 1;
        }
        ids.insert(key, id);
    }

    ids
}

/// Number of descriptor keys whose unprobed hash collides with an earlier
/// key in sorted order.
pub fn raw_id_collisions<'a>(sources: impl IntoIterator<Item = &'a str>) -> usize {
    let mut keys: Vec<(String, &'static str)> = sources
        .into_iter()
        .flat_map(|source| {
            let source = ur_core::normalize(source);
            [(source.clone(), PRESERVE_SALT), (source, START_SALT)]
        })
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut used = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|(source, salt)| !used.insert(descriptor_id(source, salt)))
        .count()
}

/// Substitution string: target with the chain parameter inserted before any
/// fragment.
fn substitution(target: &str, chain_value: &str) -> String {
    let (base, fragment) = match target.find('#') {
        Some(pos) => (&target[..pos], &target[pos..]),
        None => (target, ""),
    };

    let separator = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };

    format!(
        "{}{}{}={}{}",
        escape_substitution(base),
        separator,
        CHAIN_PARAM,
        chain_value,
        escape_substitution(fragment)
    )
}

/// Backslash is the only metacharacter in an RE2 substitution.
fn escape_substitution(s: &str) -> String {
    s.replace('\\', r"\\")
}
