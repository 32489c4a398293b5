use super::*;

// -------------------- Basic operations --------------------

#[test]
fn insert_get_update() {
    let mut sl = SkipList::new();
    sl.insert(1, 10);
    assert_eq!(sl.element_count(), 1);
    assert_eq!(sl.get(1), Some(10));

    // re-insert updates in place
    sl.insert(1, 20);
    assert_eq!(sl.get(1), Some(20));
    assert_eq!(sl.element_count(), 1);

    assert_eq!(sl.get(2), None);
}

#[test]
fn tombstone_is_stored_like_any_value() {
    let mut sl = SkipList::new();
    sl.insert(5, 50);
    sl.insert(5, TOMBSTONE);

    assert_eq!(sl.get(5), Some(TOMBSTONE));
    assert_eq!(sl.element_count(), 1);
}

#[test]
fn ordered_iteration() {
    let mut sl = SkipList::new();
    for key in [5i64, 3, 9, 1, 7, -2, 0] {
        sl.insert(key, key * 10);
    }

    let all = sl.get_all_sorted();
    let keys: Vec<i64> = all.iter().map(|p| p.key).collect();
    assert_eq!(keys, vec![-2, 0, 1, 3, 5, 7, 9]);
    assert_eq!(all[0].value, -20);
}

#[test]
fn many_inserts_stay_sorted() {
    let mut sl = SkipList::new();
    // insert in a scrambled but deterministic order
    for i in 0..10_000i64 {
        let key = (i * 7919) % 10_000;
        sl.insert(key, key);
    }
    assert_eq!(sl.element_count(), 10_000);

    let all = sl.get_all_sorted();
    assert_eq!(all.len(), 10_000);
    for (i, pair) in all.iter().enumerate() {
        assert_eq!(pair.key, i as i64);
    }
}

// -------------------- Range --------------------

#[test]
fn range_is_half_open() {
    let mut sl = SkipList::new();
    for k in 0..10i64 {
        sl.insert(k, k);
    }

    let r = sl.range(3, 7);
    let keys: Vec<i64> = r.iter().map(|p| p.key).collect();
    assert_eq!(keys, vec![3, 4, 5, 6]);
}

#[test]
fn empty_and_inverted_ranges() {
    let mut sl = SkipList::new();
    sl.insert(1, 1);

    assert!(sl.range(5, 5).is_empty());
    assert!(sl.range(9, 2).is_empty());
    assert!(sl.range(2, 9).is_empty()); // nothing in range
}

#[test]
fn range_includes_tombstones() {
    let mut sl = SkipList::new();
    sl.insert(1, 1);
    sl.insert(2, TOMBSTONE);
    sl.insert(3, 3);

    let r = sl.range(0, 10);
    assert_eq!(r.len(), 3);
    assert!(r[1].is_tombstone());
}

// -------------------- Byte accounting --------------------

#[test]
fn byte_count_grows_with_new_keys_only() {
    let mut sl = SkipList::new();
    assert_eq!(sl.byte_count(), 0);

    sl.insert(1, 1);
    let after_one = sl.byte_count();
    assert!(after_one > 0);

    // update in place: no growth
    sl.insert(1, 2);
    assert_eq!(sl.byte_count(), after_one);

    // new key: monotone growth
    sl.insert(2, 2);
    assert!(sl.byte_count() > after_one);
}

#[test]
fn clear_resets_everything() {
    let mut sl = SkipList::new();
    for k in 0..100i64 {
        sl.insert(k, k);
    }
    assert!(!sl.is_empty());

    sl.clear();
    assert!(sl.is_empty());
    assert_eq!(sl.element_count(), 0);
    assert_eq!(sl.byte_count(), 0);
    assert_eq!(sl.get(5), None);

    // usable after clear
    sl.insert(5, 55);
    assert_eq!(sl.get(5), Some(55));
}

// -------------------- Pair ordering --------------------

#[test]
fn pairs_compare_by_key_only() {
    let a = KeyValuePair::new(1, 100);
    let b = KeyValuePair::new(1, 200);
    let c = KeyValuePair::new(2, 0);

    assert_eq!(a, b);
    assert!(a < c);

    let mut v = vec![c, b, a];
    v.sort();
    assert_eq!(v[0].key, 1);
    assert_eq!(v[2].key, 2);
}

#[test]
fn extreme_keys() {
    let mut sl = SkipList::new();
    sl.insert(i64::MIN, 1);
    sl.insert(i64::MAX, 2);
    sl.insert(0, 3);

    assert_eq!(sl.get(i64::MIN), Some(1));
    assert_eq!(sl.get(i64::MAX), Some(2));

    let all = sl.get_all_sorted();
    assert_eq!(all[0].key, i64::MIN);
    assert_eq!(all[2].key, i64::MAX);
}
