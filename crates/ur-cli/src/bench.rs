use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use ur_compiler::compile_rules;
use ur_core::{find_redirect, AntidoteSelector, Rule};

const TLDS: &[&str] = &["com", "org", "net", "io", "tv"];
const PATHS: &[&str] = &["", "/feed", "/watch?v=abc", "/r/all", "/news/today", "/shorts"];

pub struct BenchOptions {
    pub rule_count: usize,
    pub url_count: usize,
    pub seed: u64,
}

struct Percentiles {
    p50: f64,
    p99: f64,
    max: f64,
}

fn percentiles(mut samples: Vec<f64>) -> Percentiles {
    if samples.is_empty() {
        return Percentiles { p50: 0.0, p99: 0.0, max: 0.0 };
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let at = |q: f64| samples[((samples.len() - 1) as f64 * q) as usize];
    Percentiles {
        p50: at(0.50),
        p99: at(0.99),
        max: samples[samples.len() - 1],
    }
}

fn synthetic_rules(rng: &mut StdRng, count: usize) -> Vec<Rule> {
    (0..count)
        .map(|i| {
            let tld = TLDS.choose(rng).copied().unwrap_or("com");
            let source = format!("site{}.{}", i, tld);
            let target = if rng.gen_ratio(1, 10) {
                ":shuffle:".to_string()
            } else {
                format!("https://focus{}.example", i)
            };
            let mut rule = Rule::new(i as i64 + 1, source, target);
            rule.active = !rng.gen_ratio(1, 20);
            rule
        })
        .collect()
}

fn synthetic_urls(rng: &mut StdRng, rule_count: usize, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let path = PATHS.choose(rng).copied().unwrap_or("");
            let www = if rng.gen_bool(0.3) { "www." } else { "" };
            if rule_count > 0 && rng.gen_bool(0.5) {
                let i = rng.gen_range(0..rule_count);
                let tld = TLDS.choose(rng).copied().unwrap_or("com");
                format!("https://{}site{}.{}{}", www, i, tld, path)
            } else {
                format!("https://{}unrelated{}.example{}", www, rng.gen::<u16>(), path)
            }
        })
        .collect()
}

pub fn run(opts: BenchOptions) -> Result<(), String> {
    if opts.url_count == 0 {
        return Err("Need at least one URL".to_string());
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let rules = synthetic_rules(&mut rng, opts.rule_count);
    let urls = synthetic_urls(&mut rng, opts.rule_count, opts.url_count);
    let mut selector = AntidoteSelector::new(StdRng::seed_from_u64(opts.seed ^ 0x5eed));

    let compile_start = Instant::now();
    let table = compile_rules(&rules, 0, &mut selector);
    let compile_ms = compile_start.elapsed().as_secs_f64() * 1000.0;

    let mut matched = 0usize;
    let mut samples = Vec::with_capacity(urls.len());
    let start = Instant::now();
    for url in &urls {
        let op_start = Instant::now();
        if find_redirect(url, &rules, 0, &mut selector).is_some() {
            matched += 1;
        }
        samples.push(op_start.elapsed().as_secs_f64() * 1_000_000.0);
    }
    let total = start.elapsed().as_secs_f64();
    let stats = percentiles(samples);

    println!("Bench (seed {})", opts.seed);
    println!("  Rules:       {} ({} descriptors, compiled in {:.1}ms)", rules.len(), table.len(), compile_ms);
    println!("  URLs:        {} ({} matched)", urls.len(), matched);
    println!("  Throughput:  {:.0} matches/s", urls.len() as f64 / total.max(f64::EPSILON));
    println!("  Latency:     p50 {:.2}us, p99 {:.2}us, max {:.2}us", stats.p50, stats.p99, stats.max);

    Ok(())
}
