use criterion::{black_box, criterion_group, criterion_main, Criterion};

use recallkit_core::model::{table_from_lists, Event};
use recallkit_core::scoring::{merge_free_recall, ScoreOptions};

/// Events for `subjects` subjects with `lists` lists of `length` items each.
///
/// Each list recalls about two thirds of its items in a shuffled order, plus
/// one repeat and one intrusion from the previous list.
fn generate_events(subjects: usize, lists: usize, length: usize) -> Vec<Event> {
    let mut subject_ids = Vec::new();
    let mut study = Vec::new();
    let mut recall = Vec::new();
    for s in 0..subjects {
        for l in 0..lists {
            subject_ids.push(format!("s{s}"));
            let items: Vec<String> = (0..length).map(|i| format!("w{l}_{i}")).collect();
            let mut recalled: Vec<String> = (0..length * 2 / 3)
                .map(|i| items[(i * 7 + s) % length].clone())
                .collect();
            recalled.dedup();
            if let Some(first) = recalled.first().cloned() {
                recalled.push(first);
            }
            if l > 0 {
                recalled.push(format!("w{}_0", l - 1));
            }
            study.push(items);
            recall.push(recalled);
        }
    }
    table_from_lists(&subject_ids, &study, &recall, None, &[]).unwrap_or_default()
}

fn bench_merge_free_recall(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_free_recall");
    let options = ScoreOptions::default();

    let small = generate_events(1, 4, 12);
    let medium = generate_events(20, 12, 24);
    let large = generate_events(100, 16, 24);

    group.bench_function("1x4x12", |b| {
        b.iter(|| merge_free_recall(black_box(&small), &options))
    });

    group.bench_function("20x12x24", |b| {
        b.iter(|| merge_free_recall(black_box(&medium), &options))
    });

    group.bench_function("100x16x24", |b| {
        b.iter(|| merge_free_recall(black_box(&large), &options))
    });

    group.finish();
}

criterion_group!(benches, bench_merge_free_recall);
criterion_main!(benches);
