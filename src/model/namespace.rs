use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Names of registered models, shared with `Class` properties so they can
/// resolve names without holding the registry itself.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    names: Rc<RefCell<BTreeSet<String>>>,
}

impl Namespace {
    pub fn register(&self, name: &str) {
        self.names.borrow_mut().insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.borrow().contains(name)
    }

    /// Resolve `name` relative to `scope`: `A::B` + `C` tries `A::B::C`,
    /// then `A::C`, then `C`. A leading `::` anchors at the top level.
    pub fn resolve(&self, scope: &str, name: &str) -> Option<String> {
        let names = self.names.borrow();
        if let Some(absolute) = name.strip_prefix("::") {
            return names.get(absolute).cloned();
        }

        let segments: Vec<&str> = scope.split("::").filter(|s| !s.is_empty()).collect();
        (0..=segments.len())
            .rev()
            .map(|depth| {
                if depth == 0 {
                    name.to_string()
                } else {
                    format!("{}::{}", segments[..depth].join("::"), name)
                }
            })
            .find(|candidate| names.contains(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_prefers_nearest_scope() {
        let namespace = Namespace::default();
        namespace.register("Shop::Order::Line");
        namespace.register("Shop::Line");
        namespace.register("Line");
        namespace.register("Customer");

        assert_eq!(namespace.resolve("Shop::Order", "Line").as_deref(), Some("Shop::Order::Line"));
        assert_eq!(namespace.resolve("Shop::Invoice", "Line").as_deref(), Some("Shop::Line"));
        assert_eq!(namespace.resolve("Shop::Order", "::Line").as_deref(), Some("Line"));
        assert_eq!(namespace.resolve("Shop::Order", "Customer").as_deref(), Some("Customer"));
        assert_eq!(namespace.resolve("Shop::Order", "Ghost"), None);
    }
}
