use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use travel_aggregator::cache::{generate_key, CacheConfig, CacheManager, SetOptions};

fn search_params(hotel_ids: &[String], check_ins: &[String]) -> serde_json::Value {
    let mut rng = thread_rng();
    json!({
        "hotel_id": hotel_ids.choose(&mut rng),
        "checkin": check_ins.choose(&mut rng),
        "guests": rng.gen_range(1..=4),
    })
}

// Mixed 30% write / 70% read workload from four threads
pub fn cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("travel_cache_mixed");

    let hotel_ids = (0..100).map(|i| format!("hotel{i}")).collect::<Vec<_>>();
    let check_ins = (1..30).map(|i| format!("2025-06-{i:02}")).collect::<Vec<_>>();
    let payload: Vec<u32> = (0..256).collect();

    for max_entries in [100usize, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(max_entries),
            &max_entries,
            |b, &max_entries| {
                b.iter(|| {
                    let cache = Arc::new(CacheManager::new(CacheConfig {
                        max_entries,
                        ..CacheConfig::default()
                    }));

                    let handles: Vec<_> = (0..4)
                        .map(|_| {
                            let cache = Arc::clone(&cache);
                            let hotel_ids = hotel_ids.clone();
                            let check_ins = check_ins.clone();
                            let payload = payload.clone();

                            thread::spawn(move || {
                                let mut rng = thread_rng();
                                for _ in 0..250 {
                                    let key = generate_key("search", &search_params(&hotel_ids, &check_ins));
                                    if rng.gen_bool(0.3) {
                                        cache.set(
                                            &key,
                                            &payload,
                                            SetOptions::ttl(Duration::from_secs(300)).with_namespace("search"),
                                        );
                                    } else {
                                        let _ = cache.get::<Vec<u32>>(&key);
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    black_box(cache.stats())
                });
            },
        );
    }

    group.finish();
}

pub fn key_generation_benchmark(c: &mut Criterion) {
    let params = json!({"destination": "paris", "checkin": "2025-06-01", "checkout": "2025-06-04", "guests": 2});
    c.bench_function("generate_key", |b| {
        b.iter(|| generate_key("search", black_box(&params)))
    });
}

criterion_group!(benches, cache_benchmark, key_generation_benchmark);
criterion_main!(benches);
