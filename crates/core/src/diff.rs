use std::collections::HashSet;

/// Names present in `live` but neither declared nor protected, in `live` order.
///
/// Membership is hash-backed so the pass stays linear in `live`. A name that
/// repeats in `live` is emitted once: the first occurrence wins.
pub fn except<S: AsRef<str>>(live: &[S], declared: &HashSet<String>, protected: &HashSet<String>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(live.len());
    let mut out = Vec::new();
    for name in live.iter().map(AsRef::as_ref) {
        if declared.contains(name) || protected.contains(name) {
            continue;
        }
        if seen.insert(name) {
            out.push(name.to_string());
        }
    }
    out
}
