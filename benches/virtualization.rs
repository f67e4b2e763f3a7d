use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grid_editor::ui::virtualization::{RowHeights, VirtualizationEngine};

fn create_engine(rows: usize, variable: bool) -> VirtualizationEngine {
    let mut engine = VirtualizationEngine::new(rows, 36).with_overscan(5, 2);
    if variable {
        let heights = (0..rows).map(|i| 28 + (i % 5) as u32 * 8).collect();
        engine.set_row_heights(RowHeights::Variable(heights), rows);
    }
    let widths: Vec<u16> = (0..40).map(|i| 100 + (i % 4) * 30).collect();
    let mut frozen = vec![false; widths.len()];
    frozen[0] = true;
    engine.set_columns(&widths, &frozen);
    engine.set_viewport(1600, 900);
    engine
}

fn benchmark_scroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_scroll");

    // Small steps should stay cheap regardless of table size
    for (label, rows) in [("10k_rows", 10_000), ("100k_rows", 100_000), ("1m_rows", 1_000_000)] {
        group.bench_function(label, |b| {
            let mut engine = create_engine(rows, true);
            engine.scroll_to((rows as u32 / 2) * 36, 0);
            let mut step: i64 = 36;
            b.iter(|| {
                step = -step;
                let window = engine.scroll_by(black_box(step), 0);
                black_box(window.rows.len());
            });
        });
    }

    group.bench_function("horizontal", |b| {
        let mut engine = create_engine(100_000, false);
        let mut step: i64 = 130;
        b.iter(|| {
            step = -step;
            black_box(engine.scroll_by(0, black_box(step)).columns.len());
        });
    });

    group.finish();
}

fn benchmark_structural_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_structure");

    group.bench_function("row_heights_100k", |b| {
        let mut engine = create_engine(100_000, false);
        let heights: Vec<u32> = (0..100_000).map(|i| 28 + (i % 5) as u32 * 8).collect();
        b.iter(|| {
            engine.set_row_heights(RowHeights::Variable(heights.clone()), heights.len());
            black_box(engine.window().rows.len());
        });
    });

    group.bench_function("column_resize", |b| {
        let mut engine = create_engine(100_000, false);
        let mut widths: Vec<u16> = (0..40).map(|i| 100 + (i % 4) * 30).collect();
        let mut frozen = vec![false; widths.len()];
        frozen[0] = true;
        b.iter(|| {
            widths[3] = if widths[3] == 120 { 200 } else { 120 };
            engine.set_columns(black_box(&widths), &frozen);
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_scroll, benchmark_structural_change);
criterion_main!(benches);
