use std::collections::BTreeMap;

/// Read-only view of the trigger→body mapping used while matching keys.
pub trait MacroSource {
    /// Body for `trigger`, if it exists.
    fn expansion(&self, trigger: &str) -> Option<String>;

    /// All triggers, ascending.
    fn triggers(&self) -> Vec<String>;

    fn contains(&self, trigger: &str) -> bool {
        self.expansion(trigger).is_some()
    }

    fn prefix_match(&self, filter: &str) -> Vec<String> {
        prefix_match(&self.triggers(), filter)
    }
}

impl MacroSource for BTreeMap<String, String> {
    fn expansion(&self, trigger: &str) -> Option<String> {
        self.get(trigger).cloned()
    }

    fn triggers(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn contains(&self, trigger: &str) -> bool {
        self.contains_key(trigger)
    }
}

/// Every trigger that starts with `filter` (case-sensitive), sorted ascending.
pub fn prefix_match<S: AsRef<str>>(triggers: &[S], filter: &str) -> Vec<String> {
    let mut matches: Vec<String> = triggers
        .iter()
        .map(|trigger| AsRef::<str>::as_ref(trigger))
        .filter(|trigger| trigger.starts_with(filter))
        .map(str::to_string)
        .collect();
    matches.sort();
    matches
}

/// What the suggestion list should do after the filter changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Update(Vec<String>),
    Hide,
}

/// Keeps the list open on an empty result only while the filter is the bare
/// prefix; any other empty result closes it.
pub fn resolve_candidates(candidates: Vec<String>, filter: &str, prefix: char) -> FilterOutcome {
    if !candidates.is_empty() {
        return FilterOutcome::Update(candidates);
    }
    let mut chars = filter.chars();
    let bare_prefix = chars.next() == Some(prefix) && chars.next().is_none();
    if bare_prefix {
        FilterOutcome::Update(Vec::new())
    } else {
        FilterOutcome::Hide
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(t, b)| (t.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn prefix_match_is_sorted_and_exact() {
        let triggers = vec!["/zeta", "/addr", "/a", "/Ab", "/ab"];
        assert_eq!(prefix_match(&triggers, "/a"), vec!["/a", "/ab", "/addr"]);
        assert_eq!(prefix_match(&triggers, "/A"), vec!["/Ab"]);
        assert!(prefix_match(&triggers, "/x").is_empty());
    }

    #[test]
    fn bare_prefix_matches_everything() {
        let source = store(&[("/b", "B"), ("/a", "A")]);
        assert_eq!(source.prefix_match("/"), vec!["/a", "/b"]);
        assert_eq!(source.prefix_match(""), vec!["/a", "/b"]);
    }

    #[test]
    fn empty_result_policy() {
        assert_eq!(
            resolve_candidates(Vec::new(), "/", '/'),
            FilterOutcome::Update(Vec::new())
        );
        assert_eq!(resolve_candidates(Vec::new(), "/x", '/'), FilterOutcome::Hide);
        assert_eq!(
            resolve_candidates(vec!["/xy".to_string()], "/x", '/'),
            FilterOutcome::Update(vec!["/xy".to_string()])
        );
    }

    #[test]
    fn map_source_lookup() {
        let source = store(&[("/hi", "Hello there")]);
        assert_eq!(source.expansion("/hi").as_deref(), Some("Hello there"));
        assert!(source.contains("/hi"));
        assert!(!source.contains("/h"));
    }
}
