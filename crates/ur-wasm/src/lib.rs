//! WebAssembly bindings for URL Redirector
//!
//! Rule lists cross the boundary as JSON strings in the extension's
//! camelCase shape. Timestamps are milliseconds since epoch passed in by
//! the caller, so nothing here reads a clock.

use std::sync::{Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use wasm_bindgen::prelude::*;

use ur_compiler::{compile_rules, DnrUpdate};
use ur_core::loops::find_loop_path;
use ur_core::url::parse_chain;
use ur_core::{
    activated_rules, find_redirect, next_state, phase, validate_new_rule, AntidoteSelector, Rule, RulePhase,
    RuleSnapshot,
};

static SELECTOR: OnceLock<Mutex<AntidoteSelector<StdRng>>> = OnceLock::new();

fn selector() -> &'static Mutex<AntidoteSelector<StdRng>> {
    SELECTOR.get_or_init(|| {
        let seed = (js_sys::Math::random() * u64::MAX as f64) as u64;
        Mutex::new(AntidoteSelector::new(StdRng::seed_from_u64(seed)))
    })
}

fn with_selector<T>(f: impl FnOnce(&mut AntidoteSelector<StdRng>) -> T) -> Result<T, JsValue> {
    let mut guard = selector()
        .lock()
        .map_err(|_| JsValue::from_str("Shuffle selector unavailable"))?;
    Ok(f(&mut guard))
}

fn parse_rules(rules_json: &str) -> Result<Vec<Rule>, JsValue> {
    serde_json::from_str(rules_json).map_err(|e| JsValue::from_str(&format!("Invalid rules: {}", e)))
}

fn parse_rule(rule_json: &str) -> Result<Rule, JsValue> {
    serde_json::from_str(rule_json).map_err(|e| JsValue::from_str(&format!("Invalid rule: {}", e)))
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

/// Seed the shuffle selector. Without a call, it is seeded on first use.
#[wasm_bindgen]
pub fn init(seed: Option<f64>) -> Result<(), JsValue> {
    let seed = seed.unwrap_or_else(|| js_sys::Math::random() * u64::MAX as f64) as u64;
    SELECTOR
        .set(Mutex::new(AntidoteSelector::new(StdRng::seed_from_u64(seed))))
        .map_err(|_| JsValue::from_str("Already initialized. Reload the page to reinitialize."))?;
    web_sys::console::debug_1(&JsValue::from_str("url-redirector core ready"));
    Ok(())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    SELECTOR.get().is_some()
}

#[wasm_bindgen]
pub fn normalize_url(url: &str) -> String {
    ur_core::normalize(url)
}

/// Sources recorded in a URL's redirect chain parameter.
#[wasm_bindgen]
pub fn chain_members(url: &str) -> JsValue {
    let members = js_sys::Array::new();
    for member in parse_chain(url) {
        members.push(&JsValue::from_str(&member));
    }
    members.into()
}

/// First applicable rule for a navigation: `{ruleId, target}` or `null`.
#[wasm_bindgen]
pub fn match_url(url: &str, rules_json: &str, now: f64) -> Result<JsValue, JsValue> {
    let rules = parse_rules(rules_json)?;
    let found = with_selector(|picker| {
        find_redirect(url, &rules, now as i64, picker).map(|found| (found.rule.id, found.target))
    })?;

    let Some((rule_id, target)) = found else {
        return Ok(JsValue::NULL);
    };
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"ruleId".into(), &JsValue::from(rule_id as f64));
    let _ = js_sys::Reflect::set(&result, &"target".into(), &JsValue::from_str(&target));
    Ok(result.into())
}

/// Admission check for a new rule: `{ok}` or `{ok: false, error, loop?}`.
#[wasm_bindgen]
pub fn validate_rule(source: &str, target: &str, rules_json: &str) -> Result<JsValue, JsValue> {
    let rules = parse_rules(rules_json)?;
    let result = js_sys::Object::new();

    match validate_new_rule(source, target, &rules) {
        Ok(()) => {
            let _ = js_sys::Reflect::set(&result, &"ok".into(), &JsValue::from(true));
        }
        Err(err) => {
            let _ = js_sys::Reflect::set(&result, &"ok".into(), &JsValue::from(false));
            let _ = js_sys::Reflect::set(&result, &"error".into(), &JsValue::from_str(&err.to_string()));
            if let Some(path) = find_loop_path(source, target, &rules) {
                let hops = js_sys::Array::new();
                for hop in path {
                    hops.push(&JsValue::from_str(&hop));
                }
                let _ = js_sys::Reflect::set(&result, &"loop".into(), &hops);
            }
        }
    }
    Ok(result.into())
}

#[wasm_bindgen]
pub fn detect_loop(source: &str, target: &str, rules_json: &str) -> Result<bool, JsValue> {
    let rules = parse_rules(rules_json)?;
    Ok(ur_core::detect_loop(source, target, &rules))
}

/// `"active"`, `"paused"` or `"disabled"`.
#[wasm_bindgen]
pub fn rule_phase(rule_json: &str, now: f64) -> Result<String, JsValue> {
    let rule = parse_rule(rule_json)?;
    let name = match phase(&rule, now as i64) {
        RulePhase::Active => "active",
        RulePhase::Paused => "paused",
        RulePhase::Disabled => "disabled",
    };
    Ok(name.to_string())
}

/// The rule after one toggle at `now`.
#[wasm_bindgen]
pub fn toggle_rule(rule_json: &str, now: f64) -> Result<JsValue, JsValue> {
    let mut rule = parse_rule(rule_json)?;
    next_state(&rule, now as i64).apply_to(&mut rule);
    to_js(&rule)
}

/// Rules that became active between two observations.
#[wasm_bindgen]
pub fn activated_since(old_json: &str, old_at: f64, new_json: &str, new_at: f64) -> Result<JsValue, JsValue> {
    let old = parse_rules(old_json)?;
    let new = parse_rules(new_json)?;
    let activated = activated_rules(
        RuleSnapshot::new(&old, old_at as i64),
        RuleSnapshot::new(&new, new_at as i64),
    );
    to_js(&activated)
}

/// Compile rules into a full declarative table replacement.
///
/// `installed_ids` are the rule IDs currently in the dynamic table.
#[wasm_bindgen]
pub fn compile_declarative(rules_json: &str, now: f64, installed_ids: Vec<i32>) -> Result<JsValue, JsValue> {
    let rules = parse_rules(rules_json)?;
    let compiled = with_selector(|picker| compile_rules(&rules, now as i64, picker))?;
    to_js(&DnrUpdate::replace_all(&installed_ids, compiled))
}
