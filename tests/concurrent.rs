use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rand::{thread_rng, Rng};
use splitq::Queue;

#[test]
fn single_producer_single_consumer_in_order() {
    const N: u32 = 10_000;
    let queue = Arc::new(Queue::new());

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..N {
                queue.push(i);
            }
        })
    };

    let mut seen = Vec::with_capacity(N as usize);
    while seen.len() < N as usize {
        if let Some(v) = queue.pop() {
            seen.push(v);
        }
    }
    producer.join().unwrap();

    assert_eq!(seen, (0..N).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn four_producers_four_consumers_conservation() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 2_500;
    const TOTAL: u32 = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(Queue::new());
    let popped_count = Arc::new(AtomicUsize::new(0));
    let seen: Arc<std::sync::Mutex<Vec<u32>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                let base = p * PER_PRODUCER;
                for i in 0..PER_PRODUCER {
                    queue.push(base + i);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let popped_count = popped_count.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                loop {
                    if popped_count.load(Ordering::Relaxed) >= TOTAL as usize {
                        break;
                    }
                    if let Some(v) = queue.pop() {
                        seen.lock().unwrap().push(v);
                        popped_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    for c in consumers {
        c.join().unwrap();
    }

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn empty_race_stress() {
    const TRIALS: usize = 2_000;
    let queue = Arc::new(Queue::new());
    let start = Arc::new(Barrier::new(2));

    let consumer = {
        let queue = queue.clone();
        let start = start.clone();
        thread::spawn(move || {
            let mut hits = 0usize;
            start.wait();
            for _ in 0..TRIALS {
                loop {
                    if queue.pop().is_some() {
                        hits += 1;
                        break;
                    }
                }
            }
            hits
        })
    };

    start.wait();
    for i in 0..TRIALS {
        queue.push(i as u32);
    }

    let hits = consumer.join().unwrap();
    assert_eq!(hits, TRIALS);
    assert!(queue.is_empty());
}

#[test]
fn drain_on_destroy_does_not_crash() {
    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let count = Arc::new(AtomicUsize::new(0));
    {
        let queue = Queue::new();
        for _ in 0..1_000 {
            queue.push(Counted(count.clone()));
        }
    }
    assert_eq!(count.load(Ordering::SeqCst), 1_000);
}

#[test]
fn interleaved_pops_never_exceed_pushed_set() {
    const TOTAL: u32 = 5_000;
    let queue = Arc::new(Queue::new());
    let pushed: Arc<std::sync::Mutex<HashSet<u32>>> = Arc::new(std::sync::Mutex::new(HashSet::new()));
    let popped: Arc<std::sync::Mutex<HashSet<u32>>> = Arc::new(std::sync::Mutex::new(HashSet::new()));

    let producer = {
        let queue = queue.clone();
        let pushed = pushed.clone();
        thread::spawn(move || {
            for i in 0..TOTAL {
                pushed.lock().unwrap().insert(i);
                queue.push(i);
            }
        })
    };

    let consumer = {
        let queue = queue.clone();
        let pushed = pushed.clone();
        let popped = popped.clone();
        thread::spawn(move || {
            let mut count = 0;
            while count < TOTAL as usize {
                if let Some(v) = queue.pop() {
                    // At the moment we observe it, v must already be a member
                    // of the pushed set (it cannot have been invented).
                    assert!(pushed.lock().unwrap().contains(&v));
                    popped.lock().unwrap().insert(v);
                    count += 1;
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert_eq!(*popped.lock().unwrap(), *pushed.lock().unwrap());
    assert!(queue.is_empty());
}

#[test]
fn randomized_schedule_preserves_conservation() {
    const PRODUCERS: u32 = 6;
    const PER_PRODUCER: u32 = 1_000;
    const TOTAL: u32 = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(Queue::new());
    let popped_count = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut rng = thread_rng();
                let base = p * PER_PRODUCER;
                for i in 0..PER_PRODUCER {
                    if rng.gen_bool(0.01) {
                        thread::yield_now();
                    }
                    queue.push(base + i);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let queue = queue.clone();
            let popped_count = popped_count.clone();
            thread::spawn(move || {
                let mut rng = thread_rng();
                loop {
                    if popped_count.load(Ordering::Relaxed) >= TOTAL as usize {
                        break;
                    }
                    if rng.gen_bool(0.01) {
                        thread::yield_now();
                    }
                    if queue.pop().is_some() {
                        popped_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    for c in consumers {
        c.join().unwrap();
    }

    assert_eq!(popped_count.load(Ordering::Relaxed) as u32, TOTAL);
    assert!(queue.is_empty());
}

#[test]
fn high_contention_eight_by_eight_completes_promptly() {
    const PRODUCERS: usize = 8;
    const CONSUMERS: usize = 8;
    const PER_PRODUCER: u32 = 100_000;
    const TOTAL: u64 = PRODUCERS as u64 * PER_PRODUCER as u64;

    let queue = Arc::new(Queue::new());
    let pushed = Arc::new(AtomicUsize::new(0));
    let popped = Arc::new(AtomicUsize::new(0));
    let done_pushing = Arc::new(AtomicBool::new(false));

    let start = Instant::now();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let queue = queue.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push(i);
                    pushed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let popped = popped.clone();
            let done_pushing = done_pushing.clone();
            thread::spawn(move || loop {
                if queue.pop().is_some() {
                    popped.fetch_add(1, Ordering::Relaxed);
                } else if done_pushing.load(Ordering::Acquire) && queue.is_empty() {
                    break;
                } else {
                    thread::yield_now();
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    done_pushing.store(true, Ordering::Release);
    for c in consumers {
        c.join().unwrap();
    }

    assert_eq!(pushed.load(Ordering::Relaxed) as u64, TOTAL);
    assert_eq!(popped.load(Ordering::Relaxed) as u64, TOTAL);
    assert!(queue.is_empty());
    assert!(
        start.elapsed() < Duration::from_secs(60),
        "high-contention run did not complete promptly; lock-free progress may be broken"
    );
}
