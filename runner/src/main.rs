use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use splitq::Queue;

/// Drives a `splitq::Queue` with a configurable number of producer and
/// consumer threads and reports whether every pushed item was popped exactly
/// once.
#[derive(Parser, Debug)]
#[command(name = "runner", version)]
struct Args {
    /// Number of producer threads.
    #[arg(short = 'p', long = "producers", default_value_t = 4)]
    producers: usize,

    /// Number of consumer threads.
    #[arg(short = 'c', long = "consumers", default_value_t = 4)]
    consumers: usize,

    /// Items pushed by each producer.
    #[arg(short = 'n', long = "items-per-producer", default_value_t = 250_000)]
    items_per_producer: u64,

    /// Raise tracing verbosity. Repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let total_items = args.producers as u64 * args.items_per_producer;
    tracing::info!(
        producers = args.producers,
        consumers = args.consumers,
        items_per_producer = args.items_per_producer,
        total_items,
        "starting run"
    );

    let queue = Arc::new(Queue::new());
    let pushed = Arc::new(AtomicU64::new(0));
    let popped = Arc::new(AtomicU64::new(0));
    let done_pushing = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let start = Instant::now();

    let mut producers = Vec::with_capacity(args.producers);
    for id in 0..args.producers {
        let queue = queue.clone();
        let pushed = pushed.clone();
        let n = args.items_per_producer;
        producers.push(thread::spawn(move || {
            tracing::debug!(producer = id, "starting");
            for i in 0..n {
                queue.push(i);
                pushed.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(producer = id, "finished");
        }));
    }

    let mut consumers = Vec::with_capacity(args.consumers);
    for id in 0..args.consumers {
        let queue = queue.clone();
        let popped = popped.clone();
        let done_pushing = done_pushing.clone();
        consumers.push(thread::spawn(move || {
            tracing::debug!(consumer = id, "starting");
            let mut local = 0u64;
            loop {
                if let Some(_value) = queue.pop() {
                    local += 1;
                    popped.fetch_add(1, Ordering::Relaxed);
                } else if done_pushing.load(Ordering::Acquire) && queue.is_empty() {
                    break;
                } else {
                    thread::yield_now();
                }
            }
            tracing::debug!(consumer = id, popped = local, "finished");
        }));
    }

    for p in producers {
        p.join().expect("producer thread panicked");
    }
    done_pushing.store(true, Ordering::Release);

    for c in consumers {
        c.join().expect("consumer thread panicked");
    }

    let elapsed = start.elapsed();
    let pushed = pushed.load(Ordering::Relaxed);
    let popped = popped.load(Ordering::Relaxed);

    tracing::info!(
        pushed,
        popped,
        elapsed_ms = elapsed.as_millis() as u64,
        "run complete"
    );

    if pushed != popped {
        eprintln!(
            "conservation check failed: pushed {pushed} items but popped {popped}"
        );
        std::process::exit(1);
    }

    println!(
        "pushed {pushed}, popped {popped}, elapsed {:.3}s ({:.0} items/s)",
        elapsed.as_secs_f64(),
        pushed as f64 / elapsed.as_secs_f64()
    );
}
