use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geofetch::decode::{select, unmasked, GridValue};
use geofetch::BoundingBox;

/// One global 0.25 degree field on 0..360 longitudes, every 50th cell masked.
fn global_grid() -> Vec<GridValue> {
    let time = Utc.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap();
    let mut cells = Vec::with_capacity(721 * 1440);
    for i in 0..721 {
        for j in 0..1440 {
            let index = i * 1440 + j;
            cells.push(GridValue {
                value: if index % 50 == 0 { f64::NAN } else { index as f64 },
                lat: 90.0 - i as f64 * 0.25,
                lon: j as f64 * 0.25,
                time,
            });
        }
    }
    cells
}

fn bench_select(c: &mut Criterion) {
    let grid = global_grid();
    let gulf = BoundingBox::new(-64.4, -63.4, 46.1, 47.0).unwrap();
    let global = BoundingBox::global();

    c.bench_function("select_gulf", |b| {
        b.iter(|| select(black_box(grid.iter().copied()), unmasked, &gulf, "era5").count())
    });
    c.bench_function("select_global", |b| {
        b.iter(|| select(black_box(grid.iter().copied()), unmasked, &global, "era5").count())
    });
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
