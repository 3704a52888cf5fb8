use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use water_demand_forecaster::domain::{Fingerprint, Resolution, Timeframe};

fn fingerprint(meter: &str, capability: &str, column: &str, hour: u32) -> Fingerprint {
    Fingerprint::new(
        meter,
        Timeframe::OneWeek,
        Resolution::Hourly,
        Utc.with_ymd_and_hms(2021, 5, 26, hour, 0, 0).unwrap(),
        capability,
        column,
    )
}

proptest! {
    #[test]
    fn stem_always_has_eight_segments(
        meter in "[a-z0-9 _/%:-]{1,12}",
        capability in "[a-z_-]{1,10}",
        column in "[A-Z_-]{0,6}",
    ) {
        let stem = fingerprint(&meter, &capability, &column, 0).file_stem();

        prop_assert_eq!(stem.split('-').count(), 8);
        prop_assert!(!stem.contains('/'));
    }

    #[test]
    fn distinct_fingerprints_have_distinct_stems(
        a in ("[a-c-]{1,4}", "[a-c_-]{1,4}", "[A-B-]{0,3}", 0u32..3),
        b in ("[a-c-]{1,4}", "[a-c_-]{1,4}", "[A-B-]{0,3}", 0u32..3),
    ) {
        let fa = fingerprint(&a.0, &a.1, &a.2, a.3);
        let fb = fingerprint(&b.0, &b.1, &b.2, b.3);

        prop_assert_eq!(fa == fb, fa.file_stem() == fb.file_stem());
    }

    #[test]
    fn plain_ignores_column(column in "[A-Z_]{0,8}") {
        let fp = fingerprint("meter", "plain", &column, 0);

        prop_assert!(fp.weather.is_plain());
        prop_assert!(fp.file_stem().ends_with("-plain-no_column"));
    }
}
