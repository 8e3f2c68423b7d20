//! Enumeration of the string tags in a tag tree.
//!
//! Every string tag is visited exactly once, with the path that addresses it
//! (see [`crate::path`]). Ordering is deterministic: compound keys ascending,
//! list elements by index. Number and array tags contain no strings and are
//! skipped.

use crate::compound::NbtCompound;
use crate::tag::NbtTag;

/// Visits every string tag reachable from `root`, in path order.
///
/// A bare string root is visited with the empty path.
pub fn for_each_string<F>(root: &NbtTag, mut visit: F)
where
    F: FnMut(&str, &str),
{
    visit_tag(root, "", true, &mut visit);
}

/// Visits every string tag inside a compound, in path order.
pub fn for_each_string_in<F>(root: &NbtCompound, mut visit: F)
where
    F: FnMut(&str, &str),
{
    visit_compound(root, "", true, &mut visit);
}

fn visit_tag<F>(tag: &NbtTag, path: &str, at_root: bool, visit: &mut F)
where
    F: FnMut(&str, &str),
{
    match tag {
        NbtTag::String(value) => visit(path, value),
        NbtTag::Compound(compound) => visit_compound(compound, path, at_root, visit),
        NbtTag::List(items) => {
            for (index, item) in items.iter().enumerate() {
                visit_tag(item, &format!("{path}[{index}]"), false, visit);
            }
        }
        _ => {}
    }
}

fn visit_compound<F>(compound: &NbtCompound, path: &str, at_root: bool, visit: &mut F)
where
    F: FnMut(&str, &str),
{
    let mut entries: Vec<&(String, NbtTag)> = compound.child_tags.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, child) in entries {
        let child_path = if at_root {
            name.clone()
        } else {
            format!("{path}/{name}")
        };
        visit_tag(child, &child_path, false, visit);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn collect(root: &NbtTag) -> Vec<(String, String)> {
        let mut rows = Vec::new();
        for_each_string(root, |path, value| {
            rows.push((path.to_string(), value.to_string()));
        });
        rows
    }

    #[test]
    fn bare_string_root_has_empty_path() {
        let rows = collect(&NbtTag::String("lonely".to_string()));
        assert_eq!(rows, vec![(String::new(), "lonely".to_string())]);
    }

    #[test]
    fn numbers_and_arrays_yield_nothing() {
        let mut root = NbtCompound::new();
        root.put_int("a", 1);
        root.put_double("b", 2.0);
        root.put("c", NbtTag::LongArray(vec![3].into_boxed_slice()));
        assert!(collect(&NbtTag::Compound(root)).is_empty());
    }

    #[test]
    fn compound_keys_are_visited_in_sorted_order() {
        let mut root = NbtCompound::new();
        root.put("zebra", "last");
        root.put("aardvark", "first");
        root.put("mango", "middle");

        let rows = collect(&NbtTag::Compound(root));
        assert_eq!(
            rows,
            vec![
                ("aardvark".to_string(), "first".to_string()),
                ("mango".to_string(), "middle".to_string()),
                ("zebra".to_string(), "last".to_string()),
            ]
        );
    }

    #[test]
    fn list_elements_keep_index_order() {
        let mut root = NbtCompound::new();
        root.put(
            "pages",
            NbtTag::List(
                vec![
                    NbtTag::String("one".to_string()),
                    NbtTag::String("two".to_string()),
                ]
                .into_boxed_slice(),
            ),
        );

        let rows = collect(&NbtTag::Compound(root));
        assert_eq!(
            rows,
            vec![
                ("pages[0]".to_string(), "one".to_string()),
                ("pages[1]".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn paths_compose_through_lists_and_compounds() {
        let mut sign = NbtCompound::new();
        sign.put("Text1", "hello");

        let mut root = NbtCompound::new();
        root.put(
            "block_entities",
            NbtTag::List(vec![NbtTag::Compound(sign)].into_boxed_slice()),
        );
        root.put(
            "nested",
            NbtTag::List(
                vec![NbtTag::List(
                    vec![NbtTag::String("deep".to_string())].into_boxed_slice(),
                )]
                .into_boxed_slice(),
            ),
        );

        let rows = collect(&NbtTag::Compound(root));
        assert_eq!(
            rows,
            vec![
                ("block_entities[0]/Text1".to_string(), "hello".to_string()),
                ("nested[0][0]".to_string(), "deep".to_string()),
            ]
        );
    }

    #[test]
    fn walker_agrees_with_assignment_paths() {
        // Every path the walker emits must resolve back to the same value
        // through the path language.
        use crate::path::{SetOutcome, TagPath};

        let mut display = NbtCompound::new();
        display.put("Name", "named");
        let mut item = NbtCompound::new();
        item.put_component("display", display);
        let mut root = NbtCompound::new();
        root.put_component("Item", item);
        root.put(
            "pages",
            NbtTag::List(vec![NbtTag::String("p".to_string())].into_boxed_slice()),
        );

        let mut paths = Vec::new();
        for_each_string_in(&root, |path, value| {
            paths.push((path.to_string(), value.to_string()));
        });
        assert_eq!(paths.len(), 2);

        for (path, value) in paths {
            let parsed = TagPath::parse(&path).unwrap();
            assert_eq!(
                parsed.assign_string(&mut root, &value),
                Ok(SetOutcome::Unchanged),
                "{path}"
            );
        }
    }
}
