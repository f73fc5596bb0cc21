//! Example of a statewide-scale merge using parallel per-route processing.
//!
//! Run with: cargo run --release --example statewide_parallel --features parallel

use nc_crash_rebin::{
    merge_aadt_crash, merge_aadt_crash_parallel, AadtAttributes, AadtSegment, CrashCounts, CrashSegment,
    MergeConfig, RouteId, RouteSegment,
};
use std::time::Instant;

fn main() {
    println!("Statewide Parallel Merge Example\n");

    let (aadt, crashes) = synthetic_network(2_000, 150);
    println!("Generated {} AADT segments and {} crash segments\n", aadt.len(), crashes.len());

    let config = MergeConfig::default();

    let start = Instant::now();
    let sequential = merge_aadt_crash(aadt.clone(), crashes.clone(), &config);
    println!("Sequential: {} rows in {:?}", sequential.rows.len(), start.elapsed());

    let start = Instant::now();
    let parallel = merge_aadt_crash_parallel(aadt, crashes, &config);
    println!("Parallel:   {} rows in {:?}", parallel.rows.len(), start.elapsed());

    let total = |rows: &[nc_crash_rebin::AggregatedInterval]| rows.iter().map(|a| a.counts.total).sum::<f64>();
    println!(
        "\nApportioned crashes: sequential {:.1}, parallel {:.1}",
        total(&sequential.aggregated),
        total(&parallel.aggregated)
    );
    println!(
        "Overlap corrections: {}, unmatched routes: {}",
        parallel.report.overlap_corrections.len(),
        parallel.report.unmatched_routes.len()
    );
}

/// Routes with unit-ish AADT segments and longer crash segments offset from them.
fn synthetic_network(routes: u32, segments_per_route: u32) -> (Vec<AadtSegment>, Vec<CrashSegment>) {
    let mut aadt = Vec::new();
    let mut crashes = Vec::new();

    for n in 0..routes {
        let class = 1 + n % 3;
        let route = RouteId::parse(&format!("{}00{:05}{:03}", class, n + 1, 1 + n % 100)).unwrap();
        let mut mp = 0.0;
        for i in 0..segments_per_route {
            let len = 0.4 + ((n + i) % 7) as f64 * 0.15;
            // Every 25th segment overlaps the next by a tenth of a mile
            let end = if i % 25 == 24 { mp + len + 0.1 } else { mp + len };
            aadt.push(RouteSegment::new(route.clone(), mp, end, AadtAttributes::new(5_000.0 + (i * 130) as f64)).unwrap());
            mp += len;
        }

        // Every tenth route has no crash data
        if n % 10 == 9 {
            continue;
        }
        let mut cmp = 0.05;
        while cmp + 1.3 < mp {
            let total = ((n as f64 + cmp) * 3.7) % 11.0;
            let ka = (total * 0.02).floor();
            let bc = (total * 0.3).floor();
            let counts = CrashCounts::new(ka, bc, total - ka - bc, total);
            crashes.push(RouteSegment::new(route.clone(), cmp, cmp + 1.3, counts).unwrap());
            cmp += 1.75;
        }
    }

    (aadt, crashes)
}
