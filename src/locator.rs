//! Data source locators.
//!
//! A [`Locator`] names a (possibly nested) field inside a prim's attribute
//! container, e.g. `xform/matrix`. Dirty notifications carry a [`LocatorSet`]
//! describing which fields changed; the flattening cache intersects that set
//! against the locators of its tracked attribute kinds.

use std::fmt;

/// Identifier of a nested field within an attribute container.
///
/// The empty locator is the "whole prim invalidated" sentinel: it intersects
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Locator {
    elements: Vec<String>,
}

impl Locator {
    /// Build a locator from field name elements, outermost first.
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// The empty "whole prim" sentinel locator.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// The element at `index`, if present.
    pub fn element(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(String::as_str)
    }

    /// True if `prefix` is this locator or an ancestor of it.
    pub fn has_prefix(&self, prefix: &Locator) -> bool {
        self.elements.len() >= prefix.elements.len()
            && self.elements[..prefix.elements.len()] == prefix.elements[..]
    }

    /// True if either locator is a prefix of the other.
    ///
    /// A dirty locator affects a tracked field when they intersect: dirtying
    /// `xform` affects `xform/matrix`, and dirtying `xform/matrix` affects a
    /// cache keyed on `xform`.
    pub fn intersects(&self, other: &Locator) -> bool {
        self.has_prefix(other) || other.has_prefix(self)
    }

    /// The first `count` elements as a new locator.
    pub fn truncated(&self, count: usize) -> Locator {
        Locator {
            elements: self.elements[..count.min(self.elements.len())].to_vec(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elements.join("/"))
    }
}

/// A minimal set of locators.
///
/// Inserting a locator drops any existing descendants of it and is a no-op
/// when an ancestor is already present, so the set stays free of redundant
/// entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocatorSet {
    locators: Vec<Locator>,
}

impl LocatorSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding a single locator.
    pub fn from_locator(locator: Locator) -> Self {
        Self {
            locators: vec![locator],
        }
    }

    /// True when the set holds no locators.
    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Number of locators in the set.
    pub fn len(&self) -> usize {
        self.locators.len()
    }

    /// Insert a locator, keeping the set minimal.
    pub fn insert(&mut self, locator: Locator) {
        if self.locators.iter().any(|held| locator.has_prefix(held)) {
            return;
        }
        self.locators.retain(|held| !held.has_prefix(&locator));
        self.locators.push(locator);
    }

    /// Insert every locator of `other`.
    pub fn insert_set(&mut self, other: &LocatorSet) {
        for locator in &other.locators {
            self.insert(locator.clone());
        }
    }

    /// True if any member intersects `locator`.
    pub fn intersects(&self, locator: &Locator) -> bool {
        self.locators.iter().any(|held| held.intersects(locator))
    }

    /// True if some member is `locator` or an ancestor of it.
    pub fn contains(&self, locator: &Locator) -> bool {
        self.locators.iter().any(|held| locator.has_prefix(held))
    }

    /// Iterate over the members.
    pub fn iter(&self) -> impl Iterator<Item = &Locator> {
        self.locators.iter()
    }
}

impl FromIterator<Locator> for LocatorSet {
    fn from_iter<I: IntoIterator<Item = Locator>>(iter: I) -> Self {
        let mut set = Self::new();
        for locator in iter {
            set.insert(locator);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects() {
        let xform = Locator::new(["xform"]);
        let matrix = Locator::new(["xform", "matrix"]);
        let vis = Locator::new(["visibility"]);

        assert!(xform.intersects(&matrix));
        assert!(matrix.intersects(&xform));
        assert!(!xform.intersects(&vis));
        assert!(Locator::empty().intersects(&xform));
        assert!(xform.intersects(&Locator::empty()));
    }

    #[test]
    fn test_set_stays_minimal() {
        let mut set = LocatorSet::new();
        set.insert(Locator::new(["primvars", "color"]));
        set.insert(Locator::new(["primvars", "width"]));
        assert_eq!(set.len(), 2);

        // Inserting the ancestor collapses the descendants.
        set.insert(Locator::new(["primvars"]));
        assert_eq!(set.len(), 1);

        // Descendants of a held ancestor are ignored.
        set.insert(Locator::new(["primvars", "color"]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_contains_versus_intersects() {
        let mut set = LocatorSet::new();
        set.insert(Locator::new(["primvars", "color"]));

        // "primvars" intersects the member but is not contained by it.
        let primvars = Locator::new(["primvars"]);
        assert!(set.intersects(&primvars));
        assert!(!set.contains(&primvars));

        assert!(set.contains(&Locator::new(["primvars", "color", "value"])));
        // The empty sentinel is only contained when itself a member.
        assert!(!set.contains(&Locator::empty()));
        set.insert(Locator::empty());
        assert!(set.contains(&Locator::empty()));
    }
}
