use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hive_inspect::{search, CancellationToken, CompareOptions, HiveComparer, MemoryKey, ValueData};

fn tree(width: u32, seed: u32) -> MemoryKey {
    let mut root = MemoryKey::builder("Root");
    for a in 0..width {
        let mut mid = MemoryKey::builder(format!("Branch{:03}", a));
        for b in 0..width {
            let mut leaf = MemoryKey::builder(format!("Leaf{:03}", b))
                .value("Index", ValueData::Dword(a * width + b))
                .value("Name", ValueData::Text(format!("branch {} leaf {}", a, b)));
            if (a + b + seed) % 17 == 0 {
                leaf = leaf.value("Marker", ValueData::Binary(vec![seed as u8; 64]));
            }
            mid = mid.subkey(leaf);
        }
        root = root.subkey(mid);
    }
    root.build()
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");
    for width in [16u32, 48] {
        let left = tree(width, 1);
        let right = tree(width, 2);
        for (label, options) in [
            ("sequential", CompareOptions::sequential()),
            ("parallel", CompareOptions::default()),
        ] {
            let comparer = HiveComparer::new(options);
            group.bench_with_input(BenchmarkId::new(label, width), &width, |b, _| {
                b.iter(|| {
                    comparer
                        .compare(Some(black_box(&left)), Some(black_box(&right)), &CancellationToken::new())
                        .unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let root = tree(48, 1);
    c.bench_function("search_whole_word", |b| {
        b.iter(|| search(black_box(&root), "leaf", false, true).len())
    });
}

criterion_group!(benches, bench_compare, bench_search);
criterion_main!(benches);
