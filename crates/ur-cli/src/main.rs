//! URL Redirector CLI
//!
//! Offline tooling around rule files: compile declarative tables, check
//! for loops, trace matches and redirect chains, and inspect the chunked
//! storage layout.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use ur_compiler::{compile_rules, raw_id_collisions, DnrUpdate};
use ur_core::loops::rules_in_loops;
use ur_core::{find_redirect, phase, AntidoteSelector, RedirectMode, RedirectorConfig, Rule, SystemClock};
use ur_service::codec::{self, chunk_count};
use ur_service::store::raw_value;
use ur_service::{Dispatcher, Effect, Event, KeyValueStore, MemoryStore, RuleStore};

mod bench;

#[derive(Parser)]
#[command(name = "ur-cli")]
#[command(about = "URL Redirector rule compiler and tools")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a rule file into a declarative table update
    Compile {
        /// Rule file (JSON array)
        #[arg(short, long)]
        rules: String,

        /// Output file for the update
        #[arg(short, long, default_value = "dnr_rules.json")]
        output: String,

        /// IDs currently installed, to be removed first
        #[arg(long, value_delimiter = ',')]
        installed: Vec<i32>,
    },

    /// Report rules that take part in a redirect cycle
    CheckLoops {
        #[arg(short, long)]
        rules: String,
    },

    /// Show which rule a URL matches
    Match {
        #[arg(short, long)]
        rules: String,

        #[arg(short, long)]
        url: String,
    },

    /// Follow a navigation through successive redirects
    Trace {
        #[arg(short, long)]
        rules: String,

        #[arg(short, long)]
        url: String,

        /// Give up after this many hops
        #[arg(long, default_value_t = 10)]
        max_hops: usize,
    },

    /// Write a rule file as chunked storage items
    Encode {
        #[arg(short, long)]
        rules: String,

        #[arg(short, long, default_value = "storage.json")]
        output: String,
    },

    /// Read chunked (or legacy) storage items back into rules
    Decode {
        /// Storage items file (JSON object)
        #[arg(short, long)]
        input: String,
    },

    /// Count raw declarative ID collisions over synthetic sources
    Collisions {
        #[arg(short, long, default_value_t = 100_000)]
        count: usize,
    },

    /// Time rule matching over synthetic rules and URLs
    Bench {
        #[arg(long, default_value_t = 500)]
        rules: usize,

        #[arg(long, default_value_t = 50_000)]
        urls: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Compile {
            rules,
            output,
            installed,
        } => cmd_compile(&rules, &output, &installed),
        Commands::CheckLoops { rules } => cmd_check_loops(&rules),
        Commands::Match { rules, url } => cmd_match(&rules, &url),
        Commands::Trace { rules, url, max_hops } => cmd_trace(&rules, &url, max_hops, config),
        Commands::Encode { rules, output } => cmd_encode(&rules, &output, &config),
        Commands::Decode { input } => cmd_decode(&input, &config),
        Commands::Collisions { count } => cmd_collisions(count),
        Commands::Bench { rules, urls, seed } => bench::run(bench::BenchOptions {
            rule_count: rules,
            url_count: urls,
            seed,
        }),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<RedirectorConfig, String> {
    let Some(path) = path else {
        return Ok(RedirectorConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    let config = RedirectorConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))?;
    log::debug!("loaded config from {}: {:?}", path, config);
    Ok(config)
}

fn read_json(path: &str) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in '{}': {}", path, e))
}

fn load_rules(path: &str) -> Result<Vec<Rule>, String> {
    let value = read_json(path)?;
    let rules = codec::from_legacy(&value).map_err(|e| format!("Invalid rules in '{}': {}", path, e))?;
    log::debug!("loaded {} rules from {}", rules.len(), path);
    Ok(rules)
}

fn write_json(path: &str, value: &impl serde::Serialize) -> Result<usize, String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize JSON: {}", e))?;
    fs::write(path, &json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
    Ok(json.len())
}

fn now_ms() -> i64 {
    ur_core::Clock::now_ms(&SystemClock)
}

fn cmd_compile(rules_path: &str, output: &str, installed: &[i32]) -> Result<(), String> {
    let start = Instant::now();
    let rules = load_rules(rules_path)?;

    let mut selector = AntidoteSelector::new(StdRng::from_entropy());
    let compiled = compile_rules(&rules, now_ms(), &mut selector);
    let descriptors = compiled.len();
    let update = DnrUpdate::replace_all(installed, compiled);
    let bytes = write_json(output, &update)?;

    println!("Compiled {} rules to '{}'", rules.len(), output);
    println!("  Descriptors: {}", descriptors);
    println!("  Removed:     {}", update.remove_rule_ids.len());
    println!("  Size:        {} bytes ({:.1} KB)", bytes, bytes as f64 / 1024.0);
    println!("  Time:        {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_check_loops(rules_path: &str) -> Result<(), String> {
    let rules = load_rules(rules_path)?;
    let looping = rules_in_loops(&rules);

    if looping.is_empty() {
        println!("No loops in {} rules", rules.len());
        return Ok(());
    }

    println!("{} of {} rules take part in a loop:", looping.len(), rules.len());
    for rule in &looping {
        println!("  [{}] {} -> {}", rule.id, rule.source, rule.target);
    }
    Err(format!("{} looping rules", looping.len()))
}

fn cmd_match(rules_path: &str, url: &str) -> Result<(), String> {
    let rules = load_rules(rules_path)?;
    let now = now_ms();
    let mut selector = AntidoteSelector::new(StdRng::from_entropy());

    match find_redirect(url, &rules, now, &mut selector) {
        Some(found) => {
            println!("Match: rule {}", found.rule.id);
            println!("  Source:  {}", found.rule.source);
            println!("  Target:  {}", found.target);
            println!("  Count:   {}", found.rule.count);
        }
        None => {
            println!("No rule applies to {}", url);
            let normalized = ur_core::normalize(url);
            for rule in rules.iter().filter(|rule| normalized.starts_with(&rule.normalized_source())) {
                println!("  [{}] {} is {:?}", rule.id, rule.source, phase(rule, now));
            }
        }
    }

    Ok(())
}

fn cmd_trace(rules_path: &str, url: &str, max_hops: usize, config: RedirectorConfig) -> Result<(), String> {
    let rules = load_rules(rules_path)?;
    let config = RedirectorConfig {
        mode: RedirectMode::Navigation,
        ..config
    };

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))?;
    runtime.block_on(async {
        let store = RuleStore::new(Arc::new(MemoryStore::new()), config, Arc::new(SystemClock));
        store.save_rules(rules).await.map_err(|e| e.to_string())?;
        let dispatcher = Dispatcher::new(Arc::new(store), AntidoteSelector::new(StdRng::from_entropy()));

        println!("  {}", url);
        let mut current = url.to_string();
        for _ in 0..=max_hops {
            let event = Event::Navigation(ur_core::NavigationEvent {
                url: current.clone(),
                frame_id: 0,
                tab_id: 1,
            });
            let effects = dispatcher.handle(event).await.map_err(|e| e.to_string())?;
            let Some(Effect::Redirect(redirect)) = effects.into_iter().next() else {
                let counts = dispatcher.store().get_rules().await.map_err(|e| e.to_string())?;
                println!("Settled. Counts:");
                for rule in counts.iter().filter(|rule| rule.count > 0) {
                    println!("  [{}] {} = {}", rule.id, rule.source, rule.count);
                }
                return Ok(());
            };
            log::debug!("rule {} count is now {}", redirect.rule_id, redirect.rule_count);
            println!("  -> {} (rule {})", redirect.target_url, redirect.rule_id);
            current = redirect.target_url;
        }
        Err(format!("Still redirecting after {} hops", max_hops))
    })
}

fn cmd_encode(rules_path: &str, output: &str, config: &RedirectorConfig) -> Result<(), String> {
    let rules = load_rules(rules_path)?;
    let items = codec::to_storage_items(&rules, &config.storage_key, config.chunk_size);
    let chunks = items.len() - 1;
    let bytes = write_json(output, &items)?;

    println!("Encoded {} rules to '{}'", rules.len(), output);
    println!("  Chunks:  {} (max {} bytes each)", chunks, config.chunk_size);
    println!("  Size:    {} bytes ({:.1} KB)", bytes, bytes as f64 / 1024.0);

    Ok(())
}

fn cmd_decode(input: &str, config: &RedirectorConfig) -> Result<(), String> {
    let items: HashMap<String, Value> =
        serde_json::from_value(read_json(input)?).map_err(|e| format!("Expected a JSON object in '{}': {}", input, e))?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))?;
    let (rules, chunks) = runtime.block_on(async {
        let backend = Arc::new(MemoryStore::new());
        backend.set(items).await.map_err(|e| e.to_string())?;
        let meta = raw_value(&*backend, &codec::meta_key(&config.storage_key))
            .await
            .map_err(|e| e.to_string())?;
        let chunks = meta.as_ref().and_then(chunk_count);
        let store = RuleStore::new(backend, config.clone(), Arc::new(SystemClock));
        let rules = store.get_rules().await.map_err(|e| e.to_string())?;
        Ok::<_, String>((rules, chunks))
    })?;

    match chunks {
        Some(n) => println!("Decoded {} rules from {} chunks", rules.len(), n),
        None => println!("Decoded {} rules from the legacy layout", rules.len()),
    }
    println!("{}", serde_json::to_string_pretty(&rules).map_err(|e| format!("Failed to serialize JSON: {}", e))?);

    Ok(())
}

fn cmd_collisions(count: usize) -> Result<(), String> {
    let sources: Vec<String> = (0..count).map(|i| format!("site-{}.example.com/path{}", i, i % 31)).collect();

    let start = Instant::now();
    let collisions = raw_id_collisions(sources.iter().map(String::as_str));

    println!("Hashed {} sources ({} keys)", count, count * 2);
    println!("  Raw collisions: {}", collisions);
    println!("  Time:           {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}
