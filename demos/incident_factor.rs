//! Example of building the composite incident-factor table.
//!
//! Run with: cargo run --example incident_factor

use nc_crash_rebin::{
    compose_incident_factors, merge_aadt_crash, rollup_by_county, AadtAttributes, CrashCounts,
    ExternalFactors, IncidentFactorConfig, MergeConfig, NationalImportanceLookup, RouteClass, RouteId,
    RouteSegment, SeverityScalingConfig, SeverityWeights,
};

fn main() {
    let i40 = RouteId::parse("10000040092").unwrap();
    let nc54 = RouteId::parse("30000054092").unwrap();

    let aadt = vec![
        RouteSegment::new(i40.clone(), 0.0, 2.0, AadtAttributes::new(98000.0)).unwrap(),
        RouteSegment::new(i40.clone(), 2.0, 4.0, AadtAttributes::new(112000.0)).unwrap(),
        RouteSegment::new(nc54.clone(), 0.0, 1.5, AadtAttributes::new(14000.0)).unwrap(),
        RouteSegment::new(nc54.clone(), 1.5, 3.0, AadtAttributes::new(11000.0)).unwrap(),
    ];
    let crashes = vec![
        RouteSegment::new(i40.clone(), 0.0, 4.0, CrashCounts::new(1.0, 12.0, 47.0, 60.0)).unwrap(),
        RouteSegment::new(nc54.clone(), 0.2, 1.4, CrashCounts::new(2.0, 3.0, 4.0, 9.0)).unwrap(),
        RouteSegment::new(nc54.clone(), 1.6, 2.9, CrashCounts::new(0.0, 1.0, 12.0, 13.0)).unwrap(),
    ];

    let merged = merge_aadt_crash(aadt, crashes, &MergeConfig::default());

    // Detour scores come from a separate network analysis, keyed by interval start
    let mut external = ExternalFactors::new();
    external.insert_detour(i40.clone(), 0.0, 0.9);
    external.insert_detour(i40.clone(), 2.0, 0.4);
    external.insert_detour(nc54.clone(), 0.0, 0.1);
    external.insert_detour(nc54.clone(), 1.5, 0.7);
    external.insert_seasonal(i40.clone(), 0.0, 1.08);

    let lookup = NationalImportanceLookup::with_default_corridors(vec![(RouteClass::Interstate, 40)]);
    let config = IncidentFactorConfig::default();
    let composite = compose_incident_factors(
        &merged.rows,
        &lookup,
        &external,
        &SeverityScalingConfig::default(),
        &config,
    );

    println!("Composite Incident Factor Example\n");
    for row in &composite {
        println!(
            "{} [{:.1}, {:.1}) inc_fac={:.3} si_fac={:.3} detour={:?} nat_imp={} map={} adj={:?}",
            row.route,
            row.interval.left,
            row.interval.right,
            row.incident_factor.unwrap_or(f64::NAN),
            row.severity.scaled.unwrap_or(f64::NAN),
            row.external.detour,
            row.national_importance.as_str(),
            row.display_in_map,
            row.adjusted_incident_factor
        );
    }

    println!("\nCounty roll-up:");
    for rollup in rollup_by_county(&composite, &SeverityWeights::default(), &config) {
        println!(
            "  county {:03} {:<6} crashes/yr={:.1} rate={:.2} inc_fac={:.3} si={:.2}",
            rollup.county,
            rollup.route_label(),
            rollup.total_per_year,
            rollup.crash_rate_per_mile_per_year,
            rollup.incident_factor,
            rollup.severity_index
        );
    }
}
