//! Reference resolution for imported attribute values.
//!
//! The interpolator answers one question:
//!
//! > Given attribute `k` with literal value `v`, is `v` really the value of
//! > some already-registered resource's attribute, and which one?
//!
//! ## Algorithm
//!
//! 1. Split `k` on `_` and build candidate group names by dropping trailing
//!    tokens, most specific first:
//!    `virtual_machine_id` → `virtual_machine_id`, `virtual_machine`, `virtual`
//! 2. For each candidate:
//!    - if a group with exactly that name is registered, search it;
//!    - then search every group containing the candidate as a whole run of
//!      `_`-delimited segments, shortest group name first (ties by name).
//!
//!    A group search tries each [`MatchStrategy`] in rank order over the
//!    group's instances (ordered by name), the leftover tokens of `k` being
//!    the attribute name for the exact strategy.
//! 3. Fall back to the flat value index: the most recently registered
//!    holder of `v` that is not the resource being written.
//!
//! Results are deterministic for a fixed registration order.

pub mod strategy;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::types::{AttributeMap, ResourceAddress};
pub use strategy::MatchStrategy;

/// Error type for interpolator registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolatorError {
    /// The type has no group after its provider prefix.
    #[error("resource type of {0} has no group after the provider prefix")]
    MissingGroup(ResourceAddress),
    /// The type belongs to another provider namespace.
    #[error("resource {address} does not belong to provider {provider:?}")]
    ForeignProvider {
        /// Offending address.
        address: ResourceAddress,
        /// This interpolator's provider.
        provider: String,
    },
}

/// Where a value was seen.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    group: String,
    name: String,
    attribute: String,
}

impl Target {
    fn is_owned_by(&self, owner: Option<(&str, &str)>) -> bool {
        owner.is_some_and(|(group, name)| self.group == group && self.name == name)
    }
}

/// Incremental index of resource attributes for one provider namespace.
#[derive(Debug, Clone)]
pub struct Interpolator {
    provider: String,
    /// group → name → attribute → value.
    resources: BTreeMap<String, BTreeMap<String, AttributeMap>>,
    /// value → every attribute holding it, in registration order.
    values: HashMap<String, Vec<Target>>,
}

impl Interpolator {
    /// Create an empty interpolator for `provider` (e.g. `aws`).
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            resources: BTreeMap::new(),
            values: HashMap::new(),
        }
    }

    /// Provider namespace.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Register (or replace) the attributes of `address`.
    ///
    /// A second registration of the same address replaces the first
    /// entirely; flat-index entries pointing at the old attributes are
    /// dropped and earlier holders of those values become visible again.
    pub fn add_resource_attributes(
        &mut self,
        address: &ResourceAddress,
        attributes: AttributeMap,
    ) -> Result<(), InterpolatorError> {
        let group = address.group();
        if group.is_empty() {
            return Err(InterpolatorError::MissingGroup(address.clone()));
        }
        if address.provider_prefix() != self.provider {
            warn!(
                address = %address,
                provider = %self.provider,
                "refusing to register resource from another provider"
            );
            return Err(InterpolatorError::ForeignProvider {
                address: address.clone(),
                provider: self.provider.clone(),
            });
        }

        let name = address.name();
        let replaced = self
            .resources
            .get(&group)
            .is_some_and(|instances| instances.contains_key(name));
        if replaced {
            self.values.retain(|_, holders| {
                holders.retain(|target| !target.is_owned_by(Some((group.as_str(), name))));
                !holders.is_empty()
            });
        }

        for (attribute, value) in &attributes {
            if value.is_empty() {
                continue;
            }
            self.values.entry(value.clone()).or_default().push(Target {
                group: group.clone(),
                name: name.to_string(),
                attribute: attribute.clone(),
            });
        }

        self.resources
            .entry(group)
            .or_default()
            .insert(name.to_string(), attributes);

        Ok(())
    }

    /// Reference for `value` of attribute `key`, if another resource holds it.
    ///
    /// Returns `None` when the literal should be kept.
    pub fn interpolate(&self, key: &str, value: &str) -> Option<String> {
        self.resolve(key, value, None)
    }

    /// Like [`interpolate`](Self::interpolate), but never references `owner`.
    pub fn interpolate_for(
        &self,
        owner: &ResourceAddress,
        key: &str,
        value: &str,
    ) -> Option<String> {
        let group = owner.group();
        self.resolve(key, value, Some((group.as_str(), owner.name())))
    }

    fn resolve(&self, key: &str, value: &str, owner: Option<(&str, &str)>) -> Option<String> {
        if value.is_empty() {
            return None;
        }

        for (candidate, suffix) in candidate_groups(key) {
            if let Some(instances) = self.resources.get(&candidate) {
                if let Some(reference) =
                    self.check_attributes(&candidate, instances, &suffix, value, owner)
                {
                    return Some(reference);
                }
            }

            for group in self.similar_groups(&candidate) {
                let instances = &self.resources[group];
                if let Some(reference) =
                    self.check_attributes(group, instances, &suffix, value, owner)
                {
                    return Some(reference);
                }
            }
        }

        let target = self
            .values
            .get(value)?
            .iter()
            .rev()
            .find(|target| !target.is_owned_by(owner))?;
        let reference = self.render(&target.group, &target.name, &target.attribute);
        debug!(key, reference = %reference, "interpolated from value index");
        Some(reference)
    }

    /// Search one group with each strategy in rank order.
    fn check_attributes(
        &self,
        group: &str,
        instances: &BTreeMap<String, AttributeMap>,
        suffix: &str,
        value: &str,
        owner: Option<(&str, &str)>,
    ) -> Option<String> {
        for strategy in MatchStrategy::RANKED {
            for (name, attributes) in instances {
                if owner == Some((group, name.as_str())) {
                    continue;
                }
                if let Some(attribute) = strategy.find(attributes, suffix, value) {
                    let reference = self.render(group, name, attribute);
                    debug!(
                        group,
                        strategy = %strategy,
                        reference = %reference,
                        "interpolated"
                    );
                    return Some(reference);
                }
            }
        }
        None
    }

    /// Registered groups containing `candidate` as whole `_` segments,
    /// excluding `candidate` itself, shortest first then by name.
    fn similar_groups(&self, candidate: &str) -> Vec<&str> {
        let needle: Vec<&str> = candidate.split('_').collect();
        let mut groups: Vec<&str> = self
            .resources
            .keys()
            .map(String::as_str)
            .filter(|group| *group != candidate && contains_segments(group, &needle))
            .collect();
        groups.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        groups
    }

    fn render(&self, group: &str, name: &str, attribute: &str) -> String {
        format!("${{{}_{}.{}.{}}}", self.provider, group, name, attribute)
    }
}

/// Whether `group` split on `_` contains `needle` as a contiguous run.
///
/// Same as matching `^(.*_)?<needle>(_.*)?$` against the group name.
fn contains_segments(group: &str, needle: &[&str]) -> bool {
    let segments: Vec<&str> = group.split('_').collect();
    segments.windows(needle.len()).any(|window| window == needle)
}

/// Candidate group names for `key`, most specific first, each paired with
/// the leftover attribute suffix.
///
/// `virtual_machine_id` → `(virtual_machine_id, "")`,
/// `(virtual_machine, id)`, `(virtual, machine_id)`.
pub(crate) fn candidate_groups(key: &str) -> Vec<(String, String)> {
    let tokens: Vec<&str> = key.split('_').collect();
    (1..=tokens.len())
        .rev()
        .map(|n| (tokens[..n].join("_"), tokens[n..].join("_")))
        .filter(|(candidate, _)| !candidate.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn address(s: &str) -> ResourceAddress {
        ResourceAddress::parse(s).unwrap()
    }

    #[test]
    fn test_candidate_groups() {
        assert_eq!(
            candidate_groups("virtual_machine_id"),
            vec![
                ("virtual_machine_id".to_string(), String::new()),
                ("virtual_machine".to_string(), "id".to_string()),
                ("virtual".to_string(), "machine_id".to_string()),
            ]
        );
        assert_eq!(candidate_groups("vpc"), vec![("vpc".to_string(), String::new())]);
        assert!(candidate_groups("").is_empty());
    }

    #[test]
    fn test_registration_errors() {
        let mut interpolator = Interpolator::new("aws");
        assert_eq!(
            interpolator.add_resource_attributes(&address("aws.front"), AttributeMap::new()),
            Err(InterpolatorError::MissingGroup(address("aws.front")))
        );
        assert!(matches!(
            interpolator.add_resource_attributes(&address("google_instance.a"), AttributeMap::new()),
            Err(InterpolatorError::ForeignProvider { .. })
        ));
        assert!(interpolator.is_empty());
    }

    #[test]
    fn test_exact_suffix_beats_other_attribute() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(
                &address("aws_subnet.a"),
                attrs(&[("arn", "shared"), ("id", "shared")]),
            )
            .unwrap();

        // Phase 2 alone would pick `arn` (first in key order).
        assert_eq!(
            interpolator.interpolate("subnet_id", "shared").as_deref(),
            Some("${aws_subnet.a.id}")
        );
        assert_eq!(
            interpolator.interpolate("subnet_whatever", "shared").as_deref(),
            Some("${aws_subnet.a.arn}")
        );
    }

    #[test]
    fn test_exact_phase_scans_all_instances_first() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.a"), attrs(&[("cidr", "v")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&address("aws_vpc.b"), attrs(&[("id", "v")]))
            .unwrap();

        assert_eq!(
            interpolator.interpolate("vpc_id", "v").as_deref(),
            Some("${aws_vpc.b.id}")
        );
    }

    #[test]
    fn test_instances_scanned_by_name() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.zeta"), attrs(&[("id", "v")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&address("aws_vpc.alpha"), attrs(&[("id", "v")]))
            .unwrap();

        assert_eq!(
            interpolator.interpolate("vpc_id", "v").as_deref(),
            Some("${aws_vpc.alpha.id}")
        );
    }

    #[test]
    fn test_fuzzy_tie_broken_by_name() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_lb_b.x"), attrs(&[("id", "v")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&address("aws_lb_a.x"), attrs(&[("id", "v")]))
            .unwrap();

        // Both groups are 4 chars; `lb_a` sorts first.
        assert_eq!(
            interpolator.interpolate("lb_id", "v").as_deref(),
            Some("${aws_lb_a.x.id}")
        );
    }

    #[test]
    fn test_fuzzy_requires_whole_segment() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_subnetwork.x"), attrs(&[("id", "v")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&address("aws_route_table.y"), attrs(&[("id", "v")]))
            .unwrap();

        // `subnet` is not a segment of `subnetwork`, `table` is one of `route_table`.
        assert_eq!(
            interpolator.interpolate("subnet_id", "v").as_deref(),
            Some("${aws_route_table.y.id}")
        );
        assert_eq!(
            interpolator.interpolate("table_id", "v").as_deref(),
            Some("${aws_route_table.y.id}")
        );
    }

    #[test]
    fn test_value_index_last_write_wins() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.a"), attrs(&[("id", "v")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&address("aws_subnet.b"), attrs(&[("vpc", "v")]))
            .unwrap();

        assert_eq!(
            interpolator.interpolate("unrelated", "v").as_deref(),
            Some("${aws_subnet.b.vpc}")
        );
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut interpolator = Interpolator::new("aws");
        let vpc = address("aws_vpc.a");
        interpolator
            .add_resource_attributes(&vpc, attrs(&[("id", "old"), ("cidr", "10.0.0.0/16")]))
            .unwrap();
        interpolator
            .add_resource_attributes(&vpc, attrs(&[("id", "new")]))
            .unwrap();

        assert_eq!(interpolator.len(), 1);
        assert_eq!(interpolator.interpolate("vpc_id", "old"), None);
        assert_eq!(interpolator.interpolate("unrelated", "10.0.0.0/16"), None);
        assert_eq!(
            interpolator.interpolate("vpc_id", "new").as_deref(),
            Some("${aws_vpc.a.id}")
        );
    }

    #[test]
    fn test_reregistration_restores_earlier_holder() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.b"), attrs(&[("id", "v")]))
            .unwrap();
        let subnet = address("aws_subnet.a");
        interpolator
            .add_resource_attributes(&subnet, attrs(&[("id", "v")]))
            .unwrap();
        assert_eq!(
            interpolator.interpolate("unrelated", "v").as_deref(),
            Some("${aws_subnet.a.id}")
        );

        interpolator
            .add_resource_attributes(&subnet, attrs(&[("id", "w")]))
            .unwrap();
        assert_eq!(
            interpolator.interpolate("unrelated", "v").as_deref(),
            Some("${aws_vpc.b.id}")
        );
        assert_eq!(
            interpolator.interpolate("unrelated", "w").as_deref(),
            Some("${aws_subnet.a.id}")
        );
    }

    #[test]
    fn test_value_index_skips_owner_for_earlier_holder() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.main"), attrs(&[("id", "v")]))
            .unwrap();
        let web = address("aws_instance.web");
        interpolator
            .add_resource_attributes(&web, attrs(&[("network", "v")]))
            .unwrap();

        assert_eq!(
            interpolator.interpolate_for(&web, "network", "v").as_deref(),
            Some("${aws_vpc.main.id}")
        );
        assert_eq!(
            interpolator
                .interpolate_for(&address("aws_vpc.main"), "network", "v")
                .as_deref(),
            Some("${aws_instance.web.network}")
        );
    }

    #[test]
    fn test_contains_segments() {
        assert!(contains_segments("virtual_machine", &["virtual"]));
        assert!(contains_segments("route_table", &["table"]));
        assert!(contains_segments("a_b_c", &["b", "c"]));
        assert!(!contains_segments("subnetwork", &["subnet"]));
        assert!(!contains_segments("a_b_c", &["a", "c"]));
        assert!(!contains_segments("lb", &["lb", "id"]));
    }

    #[test]
    fn test_interpolate_for_skips_owner() {
        let mut interpolator = Interpolator::new("aws");
        let instance = address("aws_instance.web");
        interpolator
            .add_resource_attributes(&instance, attrs(&[("id", "i-1")]))
            .unwrap();

        assert_eq!(
            interpolator.interpolate("instance_id", "i-1").as_deref(),
            Some("${aws_instance.web.id}")
        );
        assert_eq!(interpolator.interpolate_for(&instance, "instance_id", "i-1"), None);
        assert_eq!(interpolator.interpolate_for(&instance, "other", "i-1"), None);

        interpolator
            .add_resource_attributes(&address("aws_instance.api"), attrs(&[("id", "i-1")]))
            .unwrap();
        assert_eq!(
            interpolator.interpolate_for(&instance, "instance_id", "i-1").as_deref(),
            Some("${aws_instance.api.id}")
        );
    }

    #[test]
    fn test_empty_value_never_matches() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.a"), attrs(&[("description", "")]))
            .unwrap();
        assert_eq!(interpolator.interpolate("vpc_description", ""), None);
    }

    #[test]
    fn test_pattern_characters_in_key() {
        let mut interpolator = Interpolator::new("aws");
        interpolator
            .add_resource_attributes(&address("aws_vpc.a"), attrs(&[("id", "v")]))
            .unwrap();
        assert_eq!(interpolator.interpolate(".*_id", "nope"), None);
        assert_eq!(
            interpolator.interpolate(".*_id", "v").as_deref(),
            Some("${aws_vpc.a.id}")
        );
    }

    proptest! {
        #[test]
        fn prop_segment_match_is_delimited_substring(
            group in proptest::collection::vec("[a-c]{1,2}", 1..5),
            needle in proptest::collection::vec("[a-c]{1,2}", 1..3),
        ) {
            let joined = group.join("_");
            let needle_joined = needle.join("_");
            let needle: Vec<&str> = needle.iter().map(String::as_str).collect();

            prop_assert_eq!(
                contains_segments(&joined, &needle),
                format!("_{joined}_").contains(&format!("_{needle_joined}_"))
            );
        }

        #[test]
        fn prop_candidates_are_shrinking_prefixes(
            tokens in proptest::collection::vec("[a-z]{1,6}", 1..6),
        ) {
            let key = tokens.join("_");
            let candidates = candidate_groups(&key);

            prop_assert_eq!(candidates.len(), tokens.len());
            prop_assert_eq!(&candidates[0].0, &key);
            for (i, (candidate, suffix)) in candidates.iter().enumerate() {
                prop_assert_eq!(candidate, &tokens[..tokens.len() - i].join("_"));
                if suffix.is_empty() {
                    prop_assert_eq!(candidate, &key);
                } else {
                    prop_assert_eq!(format!("{candidate}_{suffix}"), key.clone());
                }
            }
        }
    }
}
