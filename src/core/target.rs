//! Build targets and the target registry
//!
//! A target is one independently buildable package. The registry keeps the
//! targets in declaration order and hands out the dispatch order for a pass.

use std::cmp::Reverse;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

/// Where a target's recipe comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeLocator {
    /// Recipe read from the local filesystem
    Local(PathBuf),
    /// Recipe downloaded over HTTP(S)
    Remote(String),
}

impl RecipeLocator {
    /// Interpret a configured recipe location
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Remote(value.to_string())
        } else {
            Self::Local(PathBuf::from(value))
        }
    }

    /// Check if the recipe must be fetched over the network
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl std::fmt::Display for RecipeLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// One build target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Unique package name
    pub name: String,
    /// Recipe location
    pub recipe: RecipeLocator,
    /// Proxy used for fetching and building, if any
    pub proxy: Option<String>,
    /// Shell command run before the build
    pub pre_build: Option<String>,
    /// Shell command run after the build
    pub post_build: Option<String>,
    /// Higher values are dispatched first
    pub priority: i32,
    /// Exclude this target from the startup pass
    pub skip_initial_build: bool,
}

impl Target {
    /// Create a target with default settings
    pub fn new(name: impl Into<String>, recipe: RecipeLocator) -> Self {
        Self {
            name: name.into(),
            recipe,
            proxy: None,
            pre_build: None,
            post_build: None,
            priority: 0,
            skip_initial_build: false,
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the proxy
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set the pre-build hook
    #[must_use]
    pub fn with_pre_build(mut self, hook: impl Into<String>) -> Self {
        self.pre_build = Some(hook.into());
        self
    }

    /// Set the post-build hook
    #[must_use]
    pub fn with_post_build(mut self, hook: impl Into<String>) -> Self {
        self.post_build = Some(hook.into());
        self
    }

    /// Exclude from the startup pass
    #[must_use]
    pub fn skip_initial(mut self) -> Self {
        self.skip_initial_build = true;
        self
    }
}

/// Check a name against pacman's package-name rules
pub fn is_valid_target_name(name: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9@_+][a-z0-9@._+-]*$").expect("static regex is valid")
    });
    pattern.is_match(name)
}

/// Ordered set of targets
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Arc<Target>>,
}

impl TargetRegistry {
    /// Create a registry, keeping declaration order
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Targets in declaration order
    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Look up a target by name
    pub fn get(&self, name: &str) -> Option<&Arc<Target>> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// All targets, highest priority first, ties in declaration order
    pub fn dispatch_order(&self) -> Vec<Arc<Target>> {
        order_by_priority(self.targets.iter().cloned())
    }

    /// Targets for the startup pass, in dispatch order
    pub fn initial_pass(&self) -> Vec<Arc<Target>> {
        order_by_priority(
            self.targets
                .iter()
                .filter(|t| !t.skip_initial_build)
                .cloned(),
        )
    }

    /// Named targets in dispatch order; unknown names are returned separately
    pub fn select(&self, names: &[String]) -> (Vec<Arc<Target>>, Vec<String>) {
        let unknown = names
            .iter()
            .filter(|n| self.get(n).is_none())
            .cloned()
            .collect();
        let selected = order_by_priority(
            self.targets
                .iter()
                .filter(|t| names.iter().any(|n| *n == t.name))
                .cloned(),
        );
        (selected, unknown)
    }
}

fn order_by_priority(targets: impl Iterator<Item = Arc<Target>>) -> Vec<Arc<Target>> {
    let mut ordered: Vec<_> = targets.collect();
    // sort_by_key is stable, so equal priorities keep declaration order
    ordered.sort_by_key(|t| Reverse(t.priority));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn target(name: &str, priority: i32) -> Target {
        Target::new(name, RecipeLocator::parse("/tmp/PKGBUILD")).with_priority(priority)
    }

    #[test]
    fn test_locator_parse() {
        assert_eq!(
            RecipeLocator::parse("https://example.com/PKGBUILD"),
            RecipeLocator::Remote("https://example.com/PKGBUILD".to_string())
        );
        assert_eq!(
            RecipeLocator::parse("/srv/recipes/foo/PKGBUILD"),
            RecipeLocator::Local(PathBuf::from("/srv/recipes/foo/PKGBUILD"))
        );
        assert!(!RecipeLocator::parse("ftp.example.com/PKGBUILD").is_remote());
    }

    #[test]
    fn test_dispatch_order_by_priority_then_declaration() {
        let registry = TargetRegistry::new(vec![
            target("a", 5),
            target("b", 1),
            target("c", 5),
            target("d", 0),
        ]);
        let names: Vec<_> = registry
            .dispatch_order()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_initial_pass_excludes_skipped() {
        let registry = TargetRegistry::new(vec![
            target("a", 0),
            target("b", 3).skip_initial(),
            target("c", 1),
        ]);
        let names: Vec<_> = registry
            .initial_pass()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn test_select_reports_unknown() {
        let registry = TargetRegistry::new(vec![target("a", 0), target("b", 2)]);
        let (selected, unknown) =
            registry.select(&["a".to_string(), "b".to_string(), "zzz".to_string()]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].name, "b");
        assert_eq!(unknown, vec!["zzz".to_string()]);
    }

    #[test]
    fn test_target_names() {
        assert!(is_valid_target_name("yay"));
        assert!(is_valid_target_name("python-foo_bar+2.0"));
        assert!(is_valid_target_name("lib32@x"));
        assert!(!is_valid_target_name(""));
        assert!(!is_valid_target_name("-flag"));
        assert!(!is_valid_target_name(".hidden"));
        assert!(!is_valid_target_name("Upper"));
        assert!(!is_valid_target_name("a/b"));
    }

    proptest! {
        #[test]
        fn prop_dispatch_order_is_sorted_and_stable(priorities in prop::collection::vec(-3i32..3, 0..20)) {
            let registry = TargetRegistry::new(
                priorities
                    .iter()
                    .enumerate()
                    .map(|(i, p)| target(&format!("t{i}"), *p))
                    .collect(),
            );
            let order = registry.dispatch_order();
            prop_assert_eq!(order.len(), priorities.len());
            for pair in order.windows(2) {
                let index = |t: &Target| t.name[1..].parse::<usize>().unwrap();
                prop_assert!(pair[0].priority >= pair[1].priority);
                if pair[0].priority == pair[1].priority {
                    prop_assert!(index(&pair[0]) < index(&pair[1]));
                }
            }
        }
    }
}
