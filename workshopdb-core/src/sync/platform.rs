//! Static table of known platform/DLC entries
//!
//! Platform requirements resolved by the app-dependency lookup are only
//! folded into the snapshot when the app id is in this table; anything
//! else is logged and ignored.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Well-known platform/DLC apps, keyed by app id
pub static KNOWN_PLATFORM_APPS: Lazy<HashMap<u64, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (294_100, "RimWorld"),
        (1_149_640, "RimWorld - Royalty"),
        (1_392_840, "RimWorld - Ideology"),
        (1_826_140, "RimWorld - Biotech"),
        (2_380_740, "RimWorld - Anomaly"),
        (3_022_790, "RimWorld - Odyssey"),
    ])
});

/// Store page for a platform app
pub fn store_url(app_id: u64) -> String {
    format!("https://store.steampowered.com/app/{app_id}")
}

/// Display name for a known platform app
pub fn known_app(app_id: u64) -> Option<&'static str> {
    KNOWN_PLATFORM_APPS.get(&app_id).copied()
}
