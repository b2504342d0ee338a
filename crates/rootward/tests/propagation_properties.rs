//! End-to-end propagation behavior over a host tree: shadowing,
//! transparency, absence, exact-once change delivery, and isolation.

use rootward_harness::{TreeHost, init_test_logging};

#[test]
fn shadowing_inner_binding_wins_for_descendants_only() {
    let mut host = TreeHost::new();
    let outer = host.mount_bind(host.root(), "theme", "outer");
    let outer_reader = host.mount_lookup(outer, "theme");
    let inner = host.mount_bind(outer, "theme", "inner");
    let inner_reader = host.mount_lookup(inner, "theme");
    host.flush();

    assert_eq!(host.value_at(inner_reader), Some("inner"));
    assert_eq!(host.value_at(outer_reader), Some("outer"));
}

#[test]
fn shadowed_provider_keeps_serving_outer_consumers() {
    let mut host = TreeHost::new();
    let outer = host.mount_bind(host.root(), "theme", 1);
    let outer_reader = host.mount_lookup(outer, "theme");
    let inner = host.mount_bind(outer, "theme", 2);
    let inner_reader = host.mount_lookup(inner, "theme");
    host.flush();

    host.set_input(outer, 10);
    host.flush();

    assert_eq!(host.value_at(outer_reader), Some(10));
    assert_eq!(host.notify_count(outer_reader), Some(1));
    // The shadowed consumer never hears about the outer change.
    assert_eq!(host.value_at(inner_reader), Some(2));
    assert_eq!(host.notify_count(inner_reader), Some(0));
}

#[test]
fn transparency_other_keys_pass_through_a_binding() {
    let mut host = TreeHost::new();
    let theme = host.mount_bind(host.root(), "theme", "dark");
    let user = host.mount_bind(theme, "user", "alice");
    let theme_below_user = host.mount_lookup(user, "theme");
    host.flush();

    assert_eq!(host.value_at(theme_below_user), Some("dark"));

    host.set_input(theme, "light");
    host.flush();
    assert_eq!(host.value_at(theme_below_user), Some("light"));
    assert_eq!(host.notify_count(theme_below_user), Some(1));
}

#[test]
fn absence_is_a_value_not_an_error() {
    let mut host = TreeHost::new();
    let bound = host.mount_bind(host.root(), "present", 1);
    let missing = host.mount_lookup(bound, "absent");
    host.flush();

    assert_eq!(host.value_at(missing), None);

    // Unrelated traffic never wakes an absent consumer.
    host.set_input(bound, 2);
    host.flush();
    assert_eq!(host.value_at(missing), None);
    assert_eq!(host.notify_count(missing), Some(0));
}

#[test]
fn one_change_one_notification_per_consumer() {
    let mut host = TreeHost::new();
    let bind = host.mount_bind(host.root(), "k", 0);
    let shallow = host.mount_lookup(bind, "k");
    let mid_group = host.mount_group(bind);
    let deep_group = host.mount_group(mid_group);
    let deep = host.mount_lookup(deep_group, "k");
    host.flush();

    host.set_input(bind, 1);
    host.flush();
    assert_eq!(host.notify_count(shallow), Some(1));
    assert_eq!(host.notify_count(deep), Some(1));

    // Equal value: the equality gate swallows it.
    host.set_input(bind, 1);
    host.flush();
    assert_eq!(host.notify_count(shallow), Some(1));
    assert_eq!(host.notify_count(deep), Some(1));

    host.set_input(bind, 2);
    host.flush();
    assert_eq!(host.notify_count(shallow), Some(2));
    assert_eq!(host.notify_count(deep), Some(2));
    assert_eq!(host.value_at(deep), Some(2));
}

#[test]
fn sibling_keys_are_isolated() {
    let mut host = TreeHost::new();
    let left = host.mount_bind(host.root(), "left", 1);
    let left_reader = host.mount_lookup(left, "left");
    let right = host.mount_bind(host.root(), "right", 1);
    let right_reader = host.mount_lookup(right, "right");
    host.flush();

    host.set_input(left, 2);
    host.flush();

    assert_eq!(host.notify_count(left_reader), Some(1));
    assert_eq!(host.notify_count(right_reader), Some(0));
    assert_eq!(host.eval_count(right_reader), Some(1), "no re-evaluation either");
    assert_eq!(host.eval_count(right), Some(1));
}

#[test]
fn value_updates_do_not_cascade_through_stable_structure() {
    // A provider high up with a long transparent corridor below: changing
    // the value must notify the consumer without re-evaluating the
    // corridor.
    let mut host = TreeHost::new();
    let bind = host.mount_bind(host.root(), "k", 0);
    let mut cursor = bind;
    let mut corridor = Vec::new();
    for _ in 0..8 {
        cursor = host.mount_group(cursor);
        corridor.push(cursor);
    }
    let reader = host.mount_lookup(cursor, "k");
    host.flush();

    host.set_input(bind, 1);
    host.flush();

    assert_eq!(host.value_at(reader), Some(1));
    assert_eq!(host.notify_count(reader), Some(1));
    for group in corridor {
        assert_eq!(host.eval_count(group), Some(1), "corridor stays cold");
    }
    // The consumer re-evaluated once after its notification.
    assert_eq!(host.eval_count(reader), Some(2));
}

#[test]
fn nested_same_key_scenario() {
    // theme=dark
    //   reader_a (theme)
    //   user=alice
    //     reader_user (user)
    //     reader_b (theme)      <- transparency through the user binding
    //     theme=light
    //       reader_c (theme)    <- shadowed
    init_test_logging();
    let mut host = TreeHost::new();
    let theme_outer = host.mount_bind(host.root(), "theme", "dark");
    let reader_a = host.mount_lookup(theme_outer, "theme");
    let user = host.mount_bind(theme_outer, "user", "alice");
    let reader_user = host.mount_lookup(user, "user");
    let reader_b = host.mount_lookup(user, "theme");
    let theme_inner = host.mount_bind(user, "theme", "light");
    let reader_c = host.mount_lookup(theme_inner, "theme");
    host.flush();

    assert_eq!(host.value_at(reader_a), Some("dark"));
    assert_eq!(host.value_at(reader_user), Some("alice"));
    assert_eq!(host.value_at(reader_b), Some("dark"));
    assert_eq!(host.value_at(reader_c), Some("light"));

    // Outer theme change: reaches a and b, never c (shadowed), never the
    // user reader (different key).
    host.set_input(theme_outer, "solar");
    host.flush();
    assert_eq!(host.value_at(reader_a), Some("solar"));
    assert_eq!(host.value_at(reader_b), Some("solar"));
    assert_eq!(host.value_at(reader_c), Some("light"));
    assert_eq!(host.notify_count(reader_a), Some(1));
    assert_eq!(host.notify_count(reader_b), Some(1));
    assert_eq!(host.notify_count(reader_c), Some(0));
    assert_eq!(host.notify_count(reader_user), Some(0));

    // User change: reaches only the user reader.
    host.set_input(user, "bob");
    host.flush();
    assert_eq!(host.value_at(reader_user), Some("bob"));
    assert_eq!(host.notify_count(reader_user), Some(1));
    assert_eq!(host.notify_count(reader_a), Some(1));
    assert_eq!(host.notify_count(reader_b), Some(1));
    assert_eq!(host.notify_count(reader_c), Some(0));
}

#[test]
fn multiple_consumers_of_one_provider_all_hear_each_change() {
    let mut host = TreeHost::new();
    let bind = host.mount_bind(host.root(), "k", 0);
    let readers: Vec<_> = (0..5).map(|_| host.mount_lookup(bind, "k")).collect();
    host.flush();

    for step in 1..=3 {
        host.set_input(bind, step);
        host.flush();
    }

    for reader in readers {
        assert_eq!(host.value_at(reader), Some(3));
        assert_eq!(host.notify_count(reader), Some(3));
    }
}

#[test]
fn empty_key_bind_is_invisible() {
    let mut host = TreeHost::new();
    let hidden = host.mount_bind(host.root(), "", 42);
    let reader = host.mount_lookup(hidden, "");
    let any_reader = host.mount_lookup(hidden, "anything");
    host.flush();

    assert_eq!(host.value_at(reader), None);
    assert_eq!(host.value_at(any_reader), None);

    host.set_input(hidden, 43);
    host.flush();
    assert_eq!(host.notify_count(reader), Some(0));
}
