//! Lookup Preloader (C4, design §4.4).
//!
//! `LookupMaps` is the frozen, batch-scoped reference cache rules consult
//! instead of issuing their own queries. `Preloader::preload` is the only
//! place in the core that is allowed to ask a [`LookupBackend`] for anything;
//! every rule reaches the result through [`crate::engine::view::ItemView::lookups`].

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Payload, Value};

/// Read-only reference cache populated once per batch. Brands are keyed by
/// name because that's the field payloads carry (`payload["brand"]`); the
/// value is the resolved numeric id a canonical rule writes into
/// `brand_id`. Absence from the map means "could not resolve" — rules must
/// drop the corresponding write rather than invent a default (P5).
#[derive(Debug, Clone, Default)]
pub struct LookupMaps {
    pub brands: BTreeMap<String, i64>,
    pub strains: BTreeMap<String, i64>,
    pub tags: BTreeMap<String, i64>,
}

impl LookupMaps {
    pub fn brand_id(&self, name: &str) -> Option<i64> {
        self.brands.get(name).copied()
    }

    pub fn strain_id(&self, name: &str) -> Option<i64> {
        self.strains.get(name).copied()
    }

    pub fn tag_id(&self, name: &str) -> Option<i64> {
        self.tags.get(name).copied()
    }
}

/// The external collaborator the Preloader queries. Implementations issue
/// one bulk round-trip per reference kind; the core never calls these
/// concurrently mid-batch, so an implementation does not need its own
/// internal batching.
pub trait LookupBackend: Send + Sync {
    fn fetch_brands(&self, names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String>;
    fn fetch_strains(&self, names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String>;
    fn fetch_tags(&self, names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String>;
}

/// Batch-scoped preloader (design §4.4). `preload` must run to completion
/// before the first item reaches the processor; a partial preload is not a
/// valid intermediate state, so any backend failure aborts the whole batch
/// rather than returning a partially-populated `LookupMaps`.
pub struct Preloader<'a> {
    backend: &'a dyn LookupBackend,
}

impl<'a> Preloader<'a> {
    pub fn new(backend: &'a dyn LookupBackend) -> Self {
        Preloader { backend }
    }

    pub fn preload(&self, raw_payloads: &[Payload]) -> Result<LookupMaps, String> {
        let brand_names = collect_string_field(raw_payloads, "brand_id")
            .into_iter()
            .chain(collect_string_field(raw_payloads, "brand"))
            .collect::<BTreeSet<_>>();
        let strain_names = collect_string_field(raw_payloads, "strain_name")
            .into_iter()
            .chain(collect_string_field(raw_payloads, "strain"))
            .collect::<BTreeSet<_>>();
        let tag_names = collect_string_list_field(raw_payloads, "tag_names")
            .into_iter()
            .chain(collect_string_list_field(raw_payloads, "tags"))
            .collect::<BTreeSet<_>>();

        let brands = self.backend.fetch_brands(&brand_names)?;
        let strains = self.backend.fetch_strains(&strain_names)?;
        let tags = self.backend.fetch_tags(&tag_names)?;
        Ok(LookupMaps { brands, strains, tags })
    }
}

fn collect_string_field(payloads: &[Payload], key: &str) -> BTreeSet<String> {
    payloads
        .iter()
        .filter_map(|p| p.get(key))
        .filter_map(value_as_nonblank_str)
        .collect()
}

fn collect_string_list_field(payloads: &[Payload], key: &str) -> BTreeSet<String> {
    payloads
        .iter()
        .filter_map(|p| p.get(key))
        .filter_map(|v| v.as_array())
        .flatten()
        .filter_map(value_as_nonblank_str)
        .collect()
}

fn value_as_nonblank_str(v: &Value) -> Option<String> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedBackend;

    impl LookupBackend for FixedBackend {
        fn fetch_brands(&self, names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
            Ok(names.iter().filter(|n| n.as_str() == "Acme").map(|n| (n.clone(), 42)).collect())
        }
        fn fetch_strains(&self, _names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
            Ok(BTreeMap::new())
        }
        fn fetch_tags(&self, _names: &BTreeSet<String>) -> Result<BTreeMap<String, i64>, String> {
            Ok(BTreeMap::new())
        }
    }

    #[test]
    fn preload_resolves_known_brand_and_drops_unknown() {
        let payloads = vec![
            Payload::from_iter([("brand".to_string(), json!("Acme"))]),
            Payload::from_iter([("brand".to_string(), json!("Unknown"))]),
        ];
        let preloader = Preloader::new(&FixedBackend);
        let maps = preloader.preload(&payloads).unwrap();
        assert_eq!(maps.brand_id("Acme"), Some(42));
        assert_eq!(maps.brand_id("Unknown"), None);
    }
}
