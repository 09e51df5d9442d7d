use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use xbase_core::{cond, IndexSpec, Runtime, RuntimeConfig, Scope, TableKind, Value};

const STATES: [&str; 5] = ["CA", "ID", "NV", "NY", "TX"];

fn populated(dir: &TempDir, size: usize) -> Runtime {
    let mut rt = Runtime::new(RuntimeConfig::with_data_dir(dir.path())).expect("Failed to create runtime");
    rt.db_mut()
        .create_table("report", "name c(20); st c(2); quantity n(5, 0)", TableKind::Cursor)
        .expect("Failed to create table");
    for i in 0..size {
        rt.db_mut()
            .insert(
                None,
                vec![
                    Value::from(format!("name_{}", i)),
                    Value::from(STATES[i % STATES.len()]),
                    Value::from((i % 100) as i32),
                ],
            )
            .unwrap();
    }
    rt
}

fn bench_scan_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_all");

    for size in [100, 1000, 10000].iter() {
        let dir = TempDir::new().unwrap();
        let mut rt = populated(&dir, *size);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut scanner = rt.scan(None, Scope::All, None, None).unwrap();
                let mut total = 0.0;
                while scanner.next(&mut rt).unwrap().is_some() {
                    total += rt.get("quantity").number();
                }
                black_box(total);
            });
        });
    }
    group.finish();
}

fn bench_count_for(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_for");

    for size in [100, 1000, 10000].iter() {
        let dir = TempDir::new().unwrap();
        let mut rt = populated(&dir, *size);
        let is_id = cond(|rt| rt.get("st").text() == "ID");

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(rt.count(None, Scope::All, Some(is_id.clone()), None).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");

    for size in [100, 1000, 10000].iter() {
        let dir = TempDir::new().unwrap();
        let mut rt = populated(&dir, *size);
        rt.db_mut().index_on(None, IndexSpec::new("name", "name")).unwrap();

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..1000 {
                    let key = format!("name_{}", (i * 7) % size);
                    black_box(rt.seek(None, key).unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan_all, bench_count_for, bench_seek);
criterion_main!(benches);
