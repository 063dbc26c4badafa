use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dwd_archive::{
    accumulation_rate, find_in_vicinity, to_delimited, vector_angle, vector_norm, LabeledSeries,
    LatLon, Station, Timeseries,
};

const HOUR: i64 = 3_600_000;

fn hourly(len: i64, f: impl Fn(i64) -> f64) -> Timeseries {
    Timeseries::from_pairs((0..len).map(|i| (i * HOUR, f(i))))
}

fn bench_derived(c: &mut Criterion) {
    let u = hourly(10_000, |i| (i as f64 * 0.1).sin() * 8.0);
    let v = hourly(10_000, |i| (i as f64 * 0.1).cos() * 8.0);
    let accumulated = hourly(10_000, |i| i as f64 * 0.3);

    c.bench_function("vector_norm", |b| b.iter(|| vector_norm(black_box(&u), black_box(&v))));
    c.bench_function("vector_angle", |b| b.iter(|| vector_angle(black_box(&u), black_box(&v))));
    c.bench_function("accumulation_rate", |b| {
        b.iter(|| accumulation_rate(black_box(&accumulated)))
    });

    let series: Vec<LabeledSeries> = ["u", "v"]
        .iter()
        .zip([u, v])
        .map(|(label, data)| LabeledSeries {
            label: label.to_string(),
            unit: "m/s".to_string(),
            data,
        })
        .collect();
    c.bench_function("to_delimited", |b| b.iter(|| to_delimited(black_box(&series), ';')));
}

fn bench_station_search(c: &mut Criterion) {
    let catalog: Vec<Station> = (0..6_000)
        .map(|i| Station {
            id: format!("{i:05}"),
            name: format!("Station {i}"),
            latitude: 47.0 + (i % 60) as f64 * 0.1,
            longitude: 6.0 + (i / 60) as f64 * 0.09,
            elevation: 100.0,
        })
        .collect();
    c.bench_function("find_in_vicinity", |b| {
        b.iter(|| {
            find_in_vicinity(
                black_box(&catalog),
                Some(LatLon(50.11, 8.68)),
                Some(50_000.0),
                Some(10),
            )
        })
    });
}

criterion_group!(benches, bench_derived, bench_station_search);
criterion_main!(benches);
