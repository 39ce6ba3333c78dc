use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

use ur_wasm::{chain_members, compile_declarative, detect_loop, init, is_initialized, match_url, normalize_url, rule_phase};

const RULES: &str = r#"[
    {"id": 1, "source": "a.com", "target": "https://b.com", "count": 0, "active": true},
    {"id": 2, "source": "c.com", "target": "d.com", "count": 0, "active": false}
]"#;

#[wasm_bindgen_test]
fn normalizes_urls() {
    assert_eq!(normalize_url("HTTPS://WWW.Example.com/Path"), "example.com/path");
}

#[wasm_bindgen_test]
fn matches_first_active_rule() {
    let found = match_url("https://www.a.com/feed", RULES, 0.0).expect("match");
    let target = js_sys::Reflect::get(&found, &"target".into()).expect("target");
    assert_eq!(target.as_string().as_deref(), Some("https://b.com"));

    let none = match_url("https://c.com", RULES, 0.0).expect("match");
    assert!(none.is_null());
}

#[wasm_bindgen_test]
fn reports_loops_and_phases() {
    assert!(detect_loop("b.com", "a.com", RULES).expect("loop"));
    assert!(!detect_loop("x.com", "y.com", RULES).expect("loop"));
    assert_eq!(
        rule_phase(r#"{"id":1,"source":"a.com","target":"b.com","pausedUntil":100}"#, 50.0).expect("phase"),
        "paused"
    );
    assert!(rule_phase("not json", 0.0).is_err());
}

#[wasm_bindgen_test]
fn compiles_and_decodes_chains() {
    // Earlier tests may already have seeded the selector
    let _ = init(Some(7.0));
    assert!(is_initialized());

    let update = compile_declarative(RULES, 0.0, vec![9]).expect("compile");
    let add = js_sys::Reflect::get(&update, &"addRules".into()).expect("addRules");
    assert_eq!(js_sys::Array::from(&add).length(), 2);

    let members = js_sys::Array::from(&chain_members("https://d.com?url_redirector=a.com,b.com"));
    assert_eq!(members.length(), 2);
    assert_eq!(members.get(0), JsValue::from_str("a.com"));
}
