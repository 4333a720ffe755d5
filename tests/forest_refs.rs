use hhds::forest::{Forest, ForestError};
use hhds::tree::{TreePos, ROOT};

fn following_data(forest: &Forest<&'static str>, root: TreePos) -> Vec<&'static str> {
    forest
        .pre_order_following(root)
        .map(|(r, p)| *forest.get_tree(r).unwrap().get_data(p))
        .collect()
}

#[test]
fn trees_are_independent_containers() {
    let mut forest: Forest<i32> = Forest::new();
    let t1 = forest.create_tree(1);
    let t2 = forest.create_tree(2);
    assert!(t1 < 0 && t2 < 0 && t1 != t2);

    forest.get_tree_mut(t1).unwrap().add_child(ROOT, 10);
    assert_eq!(*forest.get_tree(t1).unwrap().get_data(ROOT), 1);
    assert_eq!(*forest.get_tree(t2).unwrap().get_data(ROOT), 2);
    assert_eq!(forest.get_tree(t2).unwrap().pre_order(ROOT).count(), 1);
}

#[test]
fn refcount_blocks_deletion_until_the_leaf_goes() {
    let mut forest: Forest<i32> = Forest::new();
    let main = forest.create_tree(1);
    let sub = forest.create_tree(2);

    let child = forest.get_tree_mut(main).unwrap().add_child(ROOT, 10);
    forest.add_subtree_ref(main, child, sub);
    assert_eq!(forest.refcount(sub), 1);

    assert!(!forest.delete_tree(sub));
    assert!(forest.get_tree(sub).is_ok());

    forest.delete_leaf(main, child);
    assert_eq!(forest.refcount(sub), 0);
    assert!(forest.delete_tree(sub));
    assert!(matches!(forest.get_tree(sub), Err(ForestError::Tombstoned(_))));
}

#[test]
fn tombstones_are_kept_and_references_grow_monotonically() {
    let mut forest: Forest<i32> = Forest::new();
    let t1 = forest.create_tree(10);
    let t2 = forest.create_tree(20);
    let t3 = forest.create_tree(30);
    assert_eq!((t1, t2, t3), (-1, -2, -3));

    assert!(forest.delete_tree(t2));
    assert!(matches!(forest.get_tree(t2), Err(ForestError::Tombstoned(_))));
    assert!(!forest.delete_tree(t2));

    let t4 = forest.create_tree(40);
    assert_eq!(t4, -4);
    assert_eq!(*forest.get_tree(t1).unwrap().get_data(ROOT), 10);
    assert!(matches!(forest.get_tree(-9), Err(ForestError::OutOfRange(_))));
    assert!(matches!(forest.get_tree(5), Err(ForestError::OutOfRange(_))));
}

#[test]
fn following_preorder_expands_a_reference_inline() {
    let mut forest: Forest<&str> = Forest::new();
    let main = forest.create_tree("1");
    let sub = forest.create_tree("10");

    let child1 = forest.get_tree_mut(main).unwrap().add_child(ROOT, "2");
    forest.get_tree_mut(main).unwrap().add_child(ROOT, "3");
    forest.get_tree_mut(sub).unwrap().add_child(ROOT, "11");
    forest.get_tree_mut(sub).unwrap().add_child(ROOT, "12");
    forest.add_subtree_ref(main, child1, sub);

    assert_eq!(
        following_data(&forest, main),
        vec!["1", "2", "10", "11", "12", "3"]
    );

    // without following, the plain iterator stays inside the main tree
    let tree = forest.get_tree(main).unwrap();
    let plain: Vec<_> = tree.pre_order(ROOT).map(|p| *tree.get_data(p)).collect();
    assert_eq!(plain, vec!["1", "2", "3"]);
}

#[test]
fn cyclic_references_are_cut_after_one_expansion_each() {
    let mut forest: Forest<&str> = Forest::new();
    let a = forest.create_tree("a");
    let b = forest.create_tree("b");

    let ac = forest.get_tree_mut(a).unwrap().add_child(ROOT, "ac");
    let bc = forest.get_tree_mut(b).unwrap().add_child(ROOT, "bc");
    forest.add_subtree_ref(a, ac, b);
    forest.add_subtree_ref(b, bc, a);

    assert_eq!(
        following_data(&forest, a),
        vec!["a", "ac", "b", "bc", "a", "ac"]
    );
    assert_eq!(
        following_data(&forest, b),
        vec!["b", "bc", "a", "ac", "b", "bc"]
    );
}

#[test]
fn following_postorder_visits_a_callee_after_its_site() {
    let mut forest: Forest<&str> = Forest::new();
    let main = forest.create_tree("1");
    let sub = forest.create_tree("10");

    let child1 = forest.get_tree_mut(main).unwrap().add_child(ROOT, "2");
    forest.get_tree_mut(main).unwrap().add_child(ROOT, "3");
    forest.get_tree_mut(sub).unwrap().add_child(ROOT, "11");
    forest.add_subtree_ref(main, child1, sub);

    let visited: Vec<_> = forest
        .post_order_following(main)
        .map(|(r, p)| *forest.get_tree(r).unwrap().get_data(p))
        .collect();
    assert_eq!(visited, vec!["2", "11", "10", "3", "1"]);
}

#[test]
fn following_sibling_order_detours_through_references() {
    let mut forest: Forest<&str> = Forest::new();
    let main = forest.create_tree("1");
    let sub = forest.create_tree("10");

    let c1 = forest.get_tree_mut(main).unwrap().add_child(ROOT, "2");
    forest.get_tree_mut(main).unwrap().add_child(ROOT, "3");
    forest.add_subtree_ref(main, c1, sub);

    let visited: Vec<_> = forest
        .sibling_order_following(main, c1)
        .map(|(r, p)| *forest.get_tree(r).unwrap().get_data(p))
        .collect();
    assert_eq!(visited, vec!["2", "10", "3"]);
}

#[test]
fn caller_index_tracks_every_referring_site() {
    let mut forest: Forest<i32> = Forest::new();
    let a = forest.create_tree(1);
    let b = forest.create_tree(2);
    let shared = forest.create_tree(100);

    let a_child = forest.get_tree_mut(a).unwrap().add_child(ROOT, 10);
    let b_child = forest.get_tree_mut(b).unwrap().add_child(ROOT, 20);
    forest.add_subtree_ref(a, a_child, shared);
    forest.add_subtree_ref(b, b_child, shared);

    let mut callers: Vec<_> = forest.get_callers(shared).map(|c| (c.caller, c.pos)).collect();
    callers.sort();
    assert_eq!(callers, vec![(b, b_child), (a, a_child)]);
    assert_eq!(forest.refcount(shared), 2);

    forest.delete_leaf(a, a_child);
    let callers: Vec<_> = forest.get_callers(shared).map(|c| c.caller).collect();
    assert_eq!(callers, vec![b]);
    assert_eq!(forest.refcount(shared), 1);
}

#[test]
fn delete_subtree_releases_the_references_inside() {
    let mut forest: Forest<i32> = Forest::new();
    let main = forest.create_tree(1);
    let sub = forest.create_tree(2);

    let branch = forest.get_tree_mut(main).unwrap().add_child(ROOT, 10);
    let leaf = forest.get_tree_mut(main).unwrap().add_child(branch, 11);
    forest.add_subtree_ref(main, leaf, sub);
    assert_eq!(forest.refcount(sub), 1);

    forest.delete_subtree(main, branch);
    assert_eq!(forest.refcount(sub), 0);
    assert!(forest.delete_tree(sub));
    assert_eq!(forest.get_tree(main).unwrap().pre_order(ROOT).count(), 1);
}

#[test]
fn deleting_a_tree_releases_what_it_referenced() {
    let mut forest: Forest<i32> = Forest::new();
    let main = forest.create_tree(1);
    let sub = forest.create_tree(2);

    let child = forest.get_tree_mut(main).unwrap().add_child(ROOT, 10);
    forest.add_subtree_ref(main, child, sub);
    assert_eq!(forest.refcount(sub), 1);

    assert!(forest.delete_tree(main));
    assert_eq!(forest.refcount(sub), 0);
    assert!(forest.delete_tree(sub));
}

#[test]
fn cursor_descends_and_returns_to_its_caller() {
    let mut forest: Forest<i32> = Forest::new();
    let main = forest.create_tree(1);
    let sub = forest.create_tree(10);
    let leaf = forest.create_tree(100);

    let child = forest.get_tree_mut(main).unwrap().add_child(ROOT, 2);
    forest.add_subtree_ref(main, child, sub);
    let sub_child = forest.get_tree_mut(sub).unwrap().add_child(ROOT, 20);
    forest.add_subtree_ref(sub, sub_child, leaf);

    let mut cursor = forest.create_cursor(main);
    assert!(cursor.is_root());
    assert_eq!(cursor.get_current_tid(), main);
    assert_eq!(cursor.get_root_tid(), main);

    assert!(cursor.goto_first_child());
    assert_eq!(cursor.get_current_tid(), sub);
    assert_eq!(cursor.depth(), 1);

    assert!(cursor.goto_first_child());
    assert_eq!(cursor.get_current_tid(), leaf);
    assert!(cursor.is_leaf());
    assert!(!cursor.goto_first_child());

    assert!(cursor.goto_parent());
    assert_eq!(cursor.get_current_tid(), sub);
    assert!(cursor.goto_parent());
    assert_eq!(cursor.get_current_tid(), main);
    assert!(cursor.is_root());
    assert!(!cursor.goto_parent());
}

#[test]
fn shared_callee_cursors_disambiguate_by_caller() {
    let mut forest: Forest<i32> = Forest::new();
    let a = forest.create_tree(1);
    let b = forest.create_tree(2);
    let shared = forest.create_tree(100);

    let a_child = forest.get_tree_mut(a).unwrap().add_child(ROOT, 10);
    let b_child = forest.get_tree_mut(b).unwrap().add_child(ROOT, 20);
    forest.add_subtree_ref(a, a_child, shared);
    forest.add_subtree_ref(b, b_child, shared);

    let mut cursor_a = forest.create_cursor(a);
    assert!(cursor_a.goto_first_child());
    assert_eq!(cursor_a.get_current_tid(), shared);
    assert!(cursor_a.goto_parent());
    assert_eq!(cursor_a.get_current_tid(), a);

    let mut cursor_b = forest.create_cursor(b);
    assert!(cursor_b.goto_first_child());
    assert_eq!(cursor_b.get_current_tid(), shared);
    assert!(cursor_b.goto_parent());
    assert_eq!(cursor_b.get_current_tid(), b);
}

#[test]
fn cursor_walks_reference_siblings() {
    let mut forest: Forest<i32> = Forest::new();
    let top = forest.create_tree(1);
    let alu = forest.create_tree(2);
    let reg = forest.create_tree(3);

    let c1 = forest.get_tree_mut(top).unwrap().add_child(ROOT, 10);
    let c2 = forest.get_tree_mut(top).unwrap().add_child(ROOT, 11);
    forest.add_subtree_ref(top, c1, alu);
    forest.add_subtree_ref(top, c2, reg);

    let mut cursor = forest.create_cursor(top);
    assert!(cursor.goto_first_child());
    let first = cursor.get_current_tid();
    assert!(cursor.goto_next_sibling());
    let second = cursor.get_current_tid();
    assert_ne!(first, second);
    assert!(!cursor.goto_next_sibling());
    assert!(cursor.goto_prev_sibling());
    assert_eq!(cursor.get_current_tid(), first);
    assert!(!cursor.goto_prev_sibling());
}
