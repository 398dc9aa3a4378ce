use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ticketflow_core::inventory::{reservation_key, user_reservation_counter_key, zone_availability_key};
use ticketflow_core::queue::pass;
use uuid::Uuid;

const SECRET: &str = "bench-secret-at-least-32-bytes-long!";

fn queue_pass_mint_benchmark(c: &mut Criterion) {
    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let now = chrono::Utc::now().timestamp();

    c.bench_function("queue_pass_mint", |b| {
        b.iter(|| {
            let token = pass::mint(black_box(user_id), black_box(event_id), now, 300, SECRET).unwrap();
            black_box(token)
        });
    });
}

fn queue_pass_verify_benchmark(c: &mut Criterion) {
    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let now = chrono::Utc::now().timestamp();
    let token = pass::mint(user_id, event_id, now, 300, SECRET).unwrap();

    c.bench_function("queue_pass_verify", |b| {
        b.iter(|| {
            let claims = pass::verify(black_box(&token), SECRET).unwrap();
            black_box(claims)
        });
    });
}

fn key_formatting_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("inventory_key_formatting");
    let zone_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let booking_id = Uuid::new_v4();

    group.bench_function("zone_availability_key", |b| {
        b.iter(|| black_box(zone_availability_key(black_box(zone_id))));
    });
    group.bench_function("user_reservation_counter_key", |b| {
        b.iter(|| black_box(user_reservation_counter_key(black_box(user_id), black_box(event_id))));
    });
    group.bench_function("reservation_key", |b| {
        b.iter(|| black_box(reservation_key(black_box(booking_id))));
    });
    group.finish();
}

fn saga_context_mutation_benchmark(c: &mut Criterion) {
    use serde_json::json;

    let mut group = c.benchmark_group("saga_context_mutation");

    for field_count in [1, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(field_count), field_count, |b, &field_count| {
            b.iter(|| {
                let mut context = json!({});
                for i in 0..field_count {
                    context[format!("field-{i}")] = json!(Uuid::new_v4().to_string());
                }
                black_box(context)
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        queue_pass_mint_benchmark,
        queue_pass_verify_benchmark,
        key_formatting_benchmark,
        saga_context_mutation_benchmark
}

criterion_main!(benches);
