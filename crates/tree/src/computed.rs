//! Derived-field registry and detector.
//!
//! Models declare their derived fields up front as [`ComputedField`]
//! descriptors. The detector walks a concrete state tree and reports the
//! paths at which those declared fields live, so they can be kept out of
//! history.

use rewind_common::{MAX_DEPTH, Path, ShapeError, StateTree};
use std::collections::BTreeSet;
use std::fmt;

/// One segment of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this key (or decimal array index).
    Key(String),
    /// Matches any key or index.
    Any,
}

/// A path with optional `*` wildcards, e.g. `todos.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPattern(Vec<Segment>);

impl PathPattern {
    /// Parse a dotted pattern. `*` becomes [`Segment::Any`]; an empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() || dotted == "$" {
            return Self::default();
        }
        Self(
            dotted
                .split('.')
                .map(|s| match s {
                    "*" => Segment::Any,
                    key => Segment::Key(key.to_string()),
                })
                .collect(),
        )
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Whether a concrete path matches this pattern segment for segment.
    pub fn matches(&self, path: &Path) -> bool {
        self.0.len() == path.len()
            && self.0.iter().zip(path.keys()).all(|(seg, key)| match seg {
                Segment::Any => true,
                Segment::Key(k) => k == key,
            })
    }

    /// Every concrete path in `tree` matched by this pattern.
    pub fn find_in(&self, tree: &StateTree) -> Vec<Path> {
        let mut out = Vec::new();
        collect_matches(tree, &self.0, Path::root(), &mut out);
        out
    }
}

fn collect_matches(node: &StateTree, segments: &[Segment], path: Path, out: &mut Vec<Path>) {
    let Some((first, rest)) = segments.split_first() else {
        out.push(path);
        return;
    };
    match (node, first) {
        (StateTree::Object(map), Segment::Key(key)) => {
            if let Some(child) = map.get(key) {
                collect_matches(child, rest, path.child(key.as_str()), out);
            }
        }
        (StateTree::Array(items), Segment::Key(key)) => {
            if let Some(child) = key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                collect_matches(child, rest, path.child(key.as_str()), out);
            }
        }
        (StateTree::Object(map), Segment::Any) => {
            for (key, child) in map {
                collect_matches(child, rest, path.child(key.as_str()), out);
            }
        }
        (StateTree::Array(items), Segment::Any) => {
            for (i, child) in items.iter().enumerate() {
                collect_matches(child, rest, path.child(i.to_string()), out);
            }
        }
        _ => {}
    }
}

type ComputeFn = Box<dyn Fn(&StateTree) -> StateTree>;

/// A derived field: `key` on every object matched by `owner`, whose value is
/// a pure function of that owning object.
pub struct ComputedField {
    owner: PathPattern,
    key: String,
    compute: ComputeFn,
}

impl ComputedField {
    /// Declare `key` as derived on every object matching the `owner` pattern.
    pub fn new(
        owner: &str,
        key: impl Into<String>,
        compute: impl Fn(&StateTree) -> StateTree + 'static,
    ) -> Self {
        Self {
            owner: PathPattern::parse(owner),
            key: key.into(),
            compute: Box::new(compute),
        }
    }

    /// Declare `key` as derived on the root object.
    pub fn root(key: impl Into<String>, compute: impl Fn(&StateTree) -> StateTree + 'static) -> Self {
        Self::new("", key, compute)
    }

    pub fn owner(&self) -> &PathPattern {
        &self.owner
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this descriptor declares `key` on the object at `owner`.
    pub fn declares(&self, owner: &Path, key: &str) -> bool {
        self.key == key && self.owner.matches(owner)
    }

    /// Evaluate the field against its owning object.
    pub fn evaluate(&self, owner: &StateTree) -> StateTree {
        (self.compute)(owner)
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("owner", &self.owner)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// The set of derived fields a model declares.
#[derive(Debug, Default)]
pub struct ComputedRegistry {
    fields: Vec<ComputedField>,
}

impl ComputedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ComputedRegistry::register`].
    pub fn with(mut self, field: ComputedField) -> Self {
        self.register(field);
        self
    }

    pub fn register(&mut self, field: ComputedField) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComputedField> {
        self.fields.iter()
    }

    /// Whether `key` on the object at `owner` is a declared derived field.
    pub fn is_computed(&self, owner: &Path, key: &str) -> bool {
        self.fields.iter().any(|f| f.declares(owner, key))
    }

    fn declared_on<'a>(&'a self, owner: &'a Path) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.owner.matches(owner))
            .map(|f| f.key.as_str())
    }

    /// Recompute every derived field in place.
    ///
    /// Fields are evaluated in registration order, so a field may read one
    /// registered before it. Owners that are not objects are skipped.
    pub fn apply(&self, tree: &mut StateTree) {
        for field in &self.fields {
            for owner in field.owner.find_in(tree) {
                let Some(node) = owner.resolve(tree).filter(|n| n.is_object()) else {
                    continue;
                };
                let value = field.evaluate(node);
                if let Some(StateTree::Object(map)) = owner.resolve_mut(tree) {
                    map.insert(field.key.clone(), value);
                }
            }
        }
    }
}

/// Find the paths of all derived fields in `root`.
///
/// Every key of every object node is checked against the registry, along
/// with declared keys not yet materialised on that node. Derived values are
/// not descended into.
pub fn find_computed_paths(
    root: &StateTree,
    registry: &ComputedRegistry,
) -> Result<BTreeSet<Path>, ShapeError> {
    let mut found = BTreeSet::new();
    if !registry.is_empty() {
        walk(root, &Path::root(), registry, &mut found)?;
    }
    tracing::debug!(count = found.len(), "detected computed paths");
    Ok(found)
}

fn walk(
    node: &StateTree,
    path: &Path,
    registry: &ComputedRegistry,
    found: &mut BTreeSet<Path>,
) -> Result<(), ShapeError> {
    if path.len() > MAX_DEPTH {
        return Err(ShapeError::invalid(
            path.clone(),
            format!("nesting deeper than {MAX_DEPTH} levels"),
        ));
    }
    match node {
        StateTree::Object(map) => {
            for (key, child) in map {
                if registry.is_computed(path, key) {
                    found.insert(path.child(key.as_str()));
                } else {
                    walk(child, &path.child(key.as_str()), registry, found)?;
                }
            }
            for key in registry.declared_on(path) {
                if !map.contains_key(key) {
                    found.insert(path.child(key));
                }
            }
        }
        StateTree::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, &path.child(i.to_string()), registry, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}
