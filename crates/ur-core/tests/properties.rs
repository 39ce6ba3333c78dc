use proptest::prelude::*;

use ur_core::changes::activated_rules_at;
use ur_core::loops::detect_loop;
use ur_core::matcher::match_target;
use ur_core::state::{next_state, should_rule_apply};
use ur_core::Rule;

fn focus(_: &str) -> String {
    "https://focus.example".to_string()
}

fn arb_domain() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}", prop::sample::select(vec!["com", "org", "net", "io"]))
        .prop_map(|(label, tld)| format!("{}.{}", label, tld))
}

fn arb_source_spelling(domain: String) -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["", "http://", "https://", "HTTPS://"]),
        any::<bool>(),
        any::<bool>(),
        "(/[a-z]{0,6}){0,2}",
    )
        .prop_map(move |(scheme, www, upper, path)| {
            let host = if upper { domain.to_uppercase() } else { domain.clone() };
            let www = if www { "www." } else { "" };
            format!("{}{}{}{}", scheme, www, host, path)
        })
}

fn arb_rules() -> impl Strategy<Value = Vec<Rule>> {
    prop::collection::vec((arb_domain(), arb_domain(), any::<bool>(), prop::option::of(0i64..20_000)), 0..8)
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (source, target, active, paused_until))| {
                    let mut rule = Rule::new(i as i64 + 1, source, target);
                    rule.active = active;
                    rule.paused_until = paused_until;
                    rule
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn normalization_is_reflexive(
        (domain, url) in arb_domain().prop_flat_map(|d| (Just(d.clone()), arb_source_spelling(d)))
    ) {
        let rule = Rule::new(1, domain.clone(), "focus.example");
        let mut picker = focus;
        prop_assert_eq!(match_target(&url, &rule, &mut picker), Some("https://focus.example".to_string()));

        // A source spelled exactly like the URL matches it as well
        let spelled = Rule::new(1, url.clone(), "focus.example");
        prop_assert!(match_target(&url, &spelled, &mut picker).is_some());
    }

    #[test]
    fn loop_membership_is_symmetric(rules in arb_rules(), source in arb_domain(), target in arb_domain()) {
        if detect_loop(&source, &target, &rules) {
            let mut with_candidate = rules.clone();
            with_candidate.push(Rule::new(999, source.clone(), target.clone()));
            prop_assert!(detect_loop(&target, &source, &with_candidate));
        }
    }

    #[test]
    fn no_self_transition_reported(rules in arb_rules(), now in 0i64..20_000) {
        prop_assert!(activated_rules_at(&rules, &rules, now).is_empty());
    }

    #[test]
    fn toggle_twice_from_active_returns_to_active(now in 0i64..1_000_000) {
        let mut rule = Rule::new(1, "a.com", "b.com");
        next_state(&rule, now).apply_to(&mut rule);
        prop_assert!(!should_rule_apply(&rule, now));
        next_state(&rule, now).apply_to(&mut rule);
        prop_assert!(should_rule_apply(&rule, now));
        prop_assert_eq!(rule.paused_until, None);
    }
}

#[test]
fn rejects_reverse_of_existing_rule() {
    let existing = vec![Rule::new(1, "a.com", "b.com")];
    assert!(detect_loop("b.com", "a.com", &existing));
}

#[test]
fn matches_www_page_of_plain_source() {
    let rule = Rule::new(1, "a.com", "b.com");
    let mut picker = focus;
    assert_eq!(
        match_target("https://www.a.com/page", &rule, &mut picker),
        Some("https://b.com".to_string())
    );
}

#[test]
fn pause_lapses_by_time_alone() {
    let now = 1_700_000_000_000;
    let mut rule = Rule::new(1, "a.com", "b.com");
    rule.paused_until = Some(now + 5_000);
    assert!(!should_rule_apply(&rule, now));
    assert!(should_rule_apply(&rule, now + 5_001));
}
