//! A miniature packet filter as an MDD.
//!
//! Levels: protocol, source port class, destination port class. Each rule
//! accepts a range per level; the filter is the union of its rules, and
//! the deny set is the complement.
//!
//! Run with:
//! ```bash
//! cargo run --example packet_filter -- --rules 3
//! ```

use clap::Parser;

use mdd_rs::forest::Forest;
use mdd_rs::types::GarbageAlgorithm;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of synthetic accept rules.
    #[arg(long, value_name = "INT", default_value = "3")]
    rules: usize,

    /// Domain bound per level.
    #[arg(long, value_name = "INT", default_value = "15")]
    max_val: i32,

    /// Use strict (immediate) garbage collection.
    #[clap(long)]
    strict: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let m = args.max_val;
    let mut forest = Forest::new(3, &[1, m, m, m]);
    forest.toggle_sparsity(true);
    if args.strict {
        forest.set_garbage_collection(GarbageAlgorithm::Strict, 0);
    }

    // Each rule accepts one protocol value and a widening port window.
    let mut accept = forest.mdd_from_range(&[0; 4], &[0; 4])?;
    for rule in 0..args.rules {
        let proto = (rule as i32) % (m + 1);
        let lo = [1, proto, 0, 0];
        let hi = [1, proto, (rule as i32).min(m), m];
        let rule_mdd = forest.mdd_from_range(&lo, &hi)?;
        let merged = forest.max(&accept, &rule_mdd)?;
        forest.destroy_mdd(accept);
        forest.destroy_mdd(rule_mdd);
        accept = merged;
    }

    println!("accept set:");
    print!("{}", forest.print_ranges(&accept)?);
    println!("tuples accepted = {}", forest.count_tuples(&accept)?);
    println!("nodes = {}", forest.count_nodes(&accept)?);

    let deny = forest.complement(&accept)?;
    println!("tuples denied   = {}", forest.count_tuples(&deny)?);

    forest.destroy_mdd(deny);
    forest.prune();
    forest.compact_top_level();
    println!("memory after prune+compact = {} bytes", forest.mem_used());

    Ok(())
}
