//! Basic example of merging an AADT layer with a crash layer.
//!
//! Run with: cargo run --example basic_merge

use nc_crash_rebin::{
    merge_aadt_crash, missing_aadt, AadtAttributes, CrashCounts, MergeConfig, RouteId, RouteSegment,
};

fn main() {
    let i40 = RouteId::parse("10000040092").unwrap();
    let us70 = RouteId::parse("20000070092").unwrap();

    // I-40 in Wake County: the first AADT segment runs past the next one's start
    let aadt = vec![
        RouteSegment::new(i40.clone(), 0.0, 2.2, AadtAttributes::new(98000.0)).unwrap(),
        RouteSegment::new(i40.clone(), 2.0, 4.0, AadtAttributes::new(112000.0)).unwrap(),
        RouteSegment::new(i40.clone(), 4.0, 7.5, AadtAttributes::new(105000.0)).unwrap(),
        // No crash data for US 70 in this sample
        RouteSegment::new(us70.clone(), 0.0, 3.0, AadtAttributes::new(31000.0)).unwrap(),
    ];

    let crashes = vec![
        RouteSegment::new(i40.clone(), 1.0, 3.0, CrashCounts::new(2.0, 4.0, 10.0, 16.0)).unwrap(),
        RouteSegment::new(i40.clone(), 3.5, 6.5, CrashCounts::new(1.0, 9.0, 35.0, 45.0)).unwrap(),
        RouteSegment::new(i40.clone(), 4.1, 4.6, CrashCounts::new(0.0, 2.0, 4.0, 6.0)).unwrap(),
    ];

    println!("AADT / Crash Merge Example\n");

    let config = MergeConfig::default();
    let result = merge_aadt_crash(aadt.clone(), crashes, &config);

    println!("{:<12} {:>10} {:>10} {:>9} {:>8} {:>8} {:>10}", "route", "left", "right", "aadt", "total", "si", "rate/mi");
    for row in &result.rows {
        match &row.crash {
            Some(crash) => println!(
                "{:<12} {:>10.3} {:>10.3} {:>9.0} {:>8.2} {:>8.2} {:>10.2}",
                row.route.as_str(),
                row.interval.left,
                row.interval.right,
                row.aadt,
                crash.counts.total,
                crash.severity_index,
                crash.crash_rate_per_mile
            ),
            None => println!(
                "{:<12} {:>10.3} {:>10.3} {:>9.0} {:>8} {:>8} {:>10}",
                row.route.as_str(),
                row.interval.left,
                row.interval.right,
                row.aadt,
                "-",
                "-",
                "-"
            ),
        }
    }

    let report = &result.report;
    println!("\nOverlap corrections: {}", report.overlap_corrections.len());
    for correction in &report.overlap_corrections {
        println!(
            "  {} [{}, {}) -> [{}, {})",
            correction.route,
            correction.start_mp,
            correction.original_end_mp,
            correction.start_mp,
            correction.corrected_end_mp
        );
    }

    println!("Unmatched routes: {}", report.unmatched_routes.len());
    for segment in missing_aadt(&aadt, &report.unmatched_routes) {
        println!("  {} [{}, {}) aadt {}", segment.route, segment.start_mp, segment.end_mp, segment.attributes.aadt);
    }
}
