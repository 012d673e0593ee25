//! Restoring a snapshot into live state.

use rewind_common::{Path, StateTree};

/// Overwrite `live` with every path present in `snapshot`, skipping paths
/// for which `exclude` returns true.
///
/// `exclude` takes the same arguments as in [`crate::copy_filtered`] and is
/// evaluated against the live value. Object keys missing from the snapshot
/// keep their live values. Arrays take the snapshot's length and merge
/// index by index; an excluded live element stays where it is, and the live
/// array is not shortened past its last excluded element. Any other pairing
/// is replaced outright.
pub fn merge_snapshot<F>(live: &mut StateTree, snapshot: &StateTree, mut exclude: F)
where
    F: FnMut(&StateTree, &str, &Path) -> bool,
{
    merge_node(live, snapshot, &Path::root(), &mut exclude);
}

fn merge_node<F>(live: &mut StateTree, snapshot: &StateTree, path: &Path, exclude: &mut F)
where
    F: FnMut(&StateTree, &str, &Path) -> bool,
{
    match (live, snapshot) {
        (StateTree::Object(live_map), StateTree::Object(snap_map)) => {
            for (key, value) in snap_map {
                match live_map.get_mut(key) {
                    Some(existing) => {
                        if !exclude(&*existing, key, path) {
                            merge_node(existing, value, &path.child(key.as_str()), exclude);
                        }
                    }
                    None => {
                        if !exclude(value, key, path) {
                            live_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        (StateTree::Array(live_items), StateTree::Array(snap_items)) => {
            let mut keep = snap_items.len();
            for (i, item) in live_items.iter().enumerate().skip(snap_items.len()) {
                if exclude(item, &i.to_string(), path) {
                    keep = i + 1;
                }
            }
            live_items.truncate(keep);
            for (i, value) in snap_items.iter().enumerate() {
                let key = i.to_string();
                match live_items.get_mut(i) {
                    Some(existing) => {
                        if !exclude(&*existing, &key, path) {
                            merge_node(existing, value, &path.child(key), exclude);
                        }
                    }
                    None => live_items.push(value.clone()),
                }
            }
        }
        (live, snapshot) => *live = snapshot.clone(),
    }
}
