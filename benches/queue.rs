#[macro_use]
extern crate bencher;
extern crate splitq;

use bencher::Bencher;
use splitq::Queue;

fn push(b: &mut Bencher) {
    const N: u64 = 1024 * 1024;
    b.bench_n(N, |_b| {
        let queue = Queue::new();
        let mut i = 0usize;
        _b.iter(|| {
            queue.push(i);
            i += 1;
        });
    });
}

fn pop(b: &mut Bencher) {
    const N: u64 = 1024 * 1024;
    b.bench_n(N, |_b| {
        let queue = Queue::new();
        for i in 0..N {
            queue.push(i);
        }
        _b.iter(|| {
            let ret = queue.pop();
            assert!(ret.unwrap() < N);
        });
    });
}

fn push_pop_interleaved(b: &mut Bencher) {
    const N: u64 = 1024 * 1024;
    b.bench_n(N, |_b| {
        let queue = Queue::new();
        _b.iter(|| {
            queue.push(0u64);
            queue.pop().unwrap();
        });
    });
}

benchmark_group!(queue, push, pop, push_pop_interleaved);
benchmark_main!(queue);
