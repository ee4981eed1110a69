use clap::Parser;
use probe_hash::HashTable;
use probe_hash::TableConfig;

#[derive(Parser, Debug)]
struct Args {
    /// Number of keys to insert.
    #[arg(short = 'n', long = "count", default_value_t = 1000)]
    count: u64,

    /// Fraction of the inserted keys to remove afterwards.
    #[arg(short = 'r', long = "remove_ratio", default_value_t = 0.2)]
    remove_ratio: f64,

    /// Density threshold of the table.
    #[arg(short = 'd', long = "density", default_value_t = 0.5)]
    density: f64,

    /// Grave threshold of the table.
    #[arg(short = 'g', long = "graves", default_value_t = 0.25)]
    graves: f64,

    /// Print the slot map after each phase.
    #[arg(long = "dump")]
    dump: bool,
}

fn report(table: &HashTable<u64, u64>, dump: bool) {
    table.debug_stats().print();

    println!("Probe distance histogram:");
    for (distance, count) in table.probe_histogram().iter().enumerate() {
        if *count > 0 {
            println!("  {:>4}: {}", distance, count);
        }
    }

    if dump {
        table.print();
    }
}

fn main() {
    let args = Args::parse();

    let config = TableConfig::new()
        .with_density_threshold(args.density)
        .with_grave_threshold(args.graves);
    let mut table: HashTable<u64, u64> = match HashTable::with_config(config) {
        Ok(table) => table,
        Err(err) => {
            eprintln!("invalid table configuration: {err}");
            std::process::exit(2);
        }
    };

    println!("Filling table with {} keys...", args.count);
    for key in 0..args.count {
        assert!(table.insert(key, key * 2));
    }
    report(&table, args.dump);

    let removals = (args.count as f64 * args.remove_ratio.clamp(0.0, 1.0)) as u64;
    println!("Removing {} keys...", removals);
    for key in 0..removals {
        assert_eq!(table.remove(&key), Some(key * 2));
    }
    report(&table, args.dump);

    let capacity = table.capacity();
    table.rehash(capacity);
    println!("After explicit rehash at {} slots:", capacity);
    report(&table, args.dump);
}
