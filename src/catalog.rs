//! The declared catalog of launchable worker classes and the class-name
//! resolver.

/// One entry in the catalog: a fully-qualified class path and whether it is
/// part of the default launch set.
pub type CatalogEntry = (&'static str, bool);

/// The default catalog, declared in order. Order matters: the resolver
/// returns the *first* substring match, so entries earlier in this list win
/// ties.
pub const DEFAULT_CATALOG: &[CatalogEntry] = &[
    ("com.balihoo.fulfillment.deciders.coordinator", true),
    ("com.balihoo.fulfillment.workers.adwords_accountcreator", true),
    ("com.balihoo.fulfillment.workers.adwords_accountlookup", true),
    ("com.balihoo.fulfillment.workers.adwords_adgroupprocessor", true),
    ("com.balihoo.fulfillment.workers.adwords_campaignprocessor", true),
    ("com.balihoo.fulfillment.workers.adwords_imageadprocessor", true),
    ("com.balihoo.fulfillment.workers.adwords_textadprocessor", true),
    ("com.balihoo.fulfillment.workers.geonames_timezoneretriever", true),
    ("com.balihoo.fulfillment.workers.htmlrenderer", true),
    ("com.balihoo.fulfillment.workers.layoutrenderer", false),
    ("com.balihoo.fulfillment.workers.email_addressverifier", false),
    ("com.balihoo.fulfillment.workers.email_sender", false),
    ("com.balihoo.fulfillment.workers.email_verifiedaddresslister", false),
    ("com.balihoo.fulfillment.workers.facebook_poster", false),
    ("com.balihoo.fulfillment.workers.ftp_uploader", false),
    ("com.balihoo.fulfillment.workers.ftp_uploadvalidator", false),
    ("com.balihoo.fulfillment.workers.rest_client", true),
    ("com.balihoo.fulfillment.workers.benchmark", false),
    ("com.balihoo.fulfillment.workers.sendgrid_lookupsubaccount", false),
    ("com.balihoo.fulfillment.dashboard.dashboard", false),
];

/// An immutable, runtime-held catalog. Consulted only by the resolver and
/// the default-launch path.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<(String, bool)>,
}

impl Catalog {
    /// Build a catalog from an ordered list of (class_path, enabled) pairs.
    pub fn new(entries: Vec<(String, bool)>) -> Self {
        Catalog { entries }
    }

    /// The default catalog.
    pub fn default_catalog() -> Self {
        Catalog::new(
            DEFAULT_CATALOG
                .iter()
                .map(|(path, enabled)| (path.to_string(), *enabled))
                .collect(),
        )
    }

    /// The default launch set: every entry with `enabled == true`, in
    /// declared order.
    pub fn enabled_subset(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn contains_exact(&self, class_name: &str) -> bool {
        self.entries.iter().any(|(path, _)| path == class_name)
    }

    /// Resolve a partial or full class name to a catalog entry.
    ///
    /// Exact match wins. Otherwise, scan in declared order and return the
    /// first entry whose fully qualified name contains `class_name` as a
    /// substring. If nothing matches, pass `class_name` through unchanged.
    pub fn resolve(&self, class_name: &str) -> String {
        if self.contains_exact(class_name) {
            return class_name.to_string();
        }
        for (path, _) in &self.entries {
            if path.contains(class_name) {
                return path.clone();
            }
        }
        class_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_enabled_subset_has_expected_entries() {
        let catalog = Catalog::default_catalog();
        let enabled = catalog.enabled_subset();
        assert!(enabled.contains(&"com.balihoo.fulfillment.deciders.coordinator".to_string()));
        assert!(enabled.contains(&"com.balihoo.fulfillment.workers.htmlrenderer".to_string()));
        assert!(!enabled.contains(&"com.balihoo.fulfillment.workers.layoutrenderer".to_string()));
    }

    #[test]
    fn resolve_exact_match_wins() {
        let catalog = Catalog::default_catalog();
        let resolved = catalog.resolve("com.balihoo.fulfillment.workers.rest_client");
        assert_eq!(resolved, "com.balihoo.fulfillment.workers.rest_client");
    }

    #[test]
    fn resolve_partial_match() {
        let catalog = Catalog::default_catalog();
        let resolved = catalog.resolve("htmlrenderer");
        assert_eq!(resolved, "com.balihoo.fulfillment.workers.htmlrenderer");
    }

    #[test]
    fn resolve_passthrough_for_unknown() {
        let catalog = Catalog::default_catalog();
        let resolved = catalog.resolve("com.x.y.z.unknown");
        assert_eq!(resolved, "com.x.y.z.unknown");
    }

    #[test]
    fn resolve_is_idempotent() {
        let catalog = Catalog::default_catalog();
        for needle in ["htmlrenderer", "com.x.y.z.unknown", "adwords_accountcreator"] {
            let once = catalog.resolve(needle);
            let twice = catalog.resolve(&once);
            assert_eq!(once, twice, "resolve should be idempotent for {needle}");
        }
    }

    #[test]
    fn resolve_ordering_prefers_earlier_declared_entry() {
        // "adwords_" is a substring of several entries; declared order
        // (accountcreator first) must win.
        let catalog = Catalog::default_catalog();
        let resolved = catalog.resolve("adwords_a");
        assert_eq!(
            resolved,
            "com.balihoo.fulfillment.workers.adwords_accountcreator"
        );
    }
}
