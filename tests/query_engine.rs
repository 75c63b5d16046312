//! # Query Engine Integration Tests
//!
//! End-to-end coverage of parse → type-check → evaluate → order, driven
//! through the public `Group::query` entry point.

use refdb::query::MixedArguments;
use refdb::table::{Group, TableKey};
use refdb::types::{DataType, ObjKey, Timestamp, Value};
use refdb::CoreError;

fn people_fixture() -> (Group, TableKey, Vec<ObjKey>) {
    let mut group = Group::new();
    let table = group.add_table("class_Person");
    let t = group.table_mut(table);
    let name = t.add_column("name", DataType::String, true);
    let age = t.add_column("age", DataType::Int, false);

    let rows = [("foo", 10), ("bar", 20), ("Foobar", 30)];
    let keys: Vec<ObjKey> = rows
        .iter()
        .map(|(n, a)| {
            let obj = t.create_object();
            t.set(obj, name, Value::String((*n).into())).unwrap();
            t.set(obj, age, Value::Int(*a)).unwrap();
            obj
        })
        .collect();
    (group, table, keys)
}

fn names_of(group: &Group, table: TableKey, keys: &[ObjKey]) -> Vec<String> {
    let name = group.table(table).column_key("name").unwrap();
    keys.iter()
        .map(|&k| match group.table(table).get(k, name).unwrap() {
            refdb::table::Cell::Scalar(Value::String(s)) => s.clone(),
            other => panic!("unexpected cell {:?}", other),
        })
        .collect()
}

#[test]
fn type_mismatch_is_rejected() {
    let (group, table, _) = people_fixture();
    let err = group.query(table, "age > 'x'").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::Type(_))
    ));
}

#[test]
fn string_equality_selects_exactly_one_row() {
    let (group, table, keys) = people_fixture();
    let hits = group.query(table, "name == 'foo'").unwrap().find_all();
    assert_eq!(hits, vec![keys[0]]);
}

#[test]
fn case_insensitive_contains() {
    let (group, table, _) = people_fixture();
    let hits = group
        .query(table, "name CONTAINS[c] 'FO'")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["foo", "Foobar"]);
}

#[test]
fn case_sensitive_contains_misses() {
    let (group, table, _) = people_fixture();
    let hits = group.query(table, "name CONTAINS 'FO'").unwrap().find_all();
    assert!(hits.is_empty());
}

#[test]
fn begins_and_ends_with() {
    let (group, table, _) = people_fixture();
    let hits = group
        .query(table, "name BEGINSWITH 'Foo'")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["Foobar"]);

    let hits = group
        .query(table, "name ENDSWITH[c] 'BAR'")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["bar", "Foobar"]);
}

#[test]
fn like_wildcards_match() {
    let (group, table, _) = people_fixture();
    let hits = group.query(table, "name LIKE 'f*'").unwrap().find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["foo"]);
    let hits = group.query(table, "name LIKE[c] '?oo*'").unwrap().find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["foo", "Foobar"]);
}

#[test]
fn boolean_connectives_and_not() {
    let (group, table, _) = people_fixture();
    let hits = group
        .query(table, "age > 5 && age < 25 && NOT name == 'bar'")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["foo"]);

    let hits = group
        .query(table, "name == 'foo' || name == 'bar'")
        .unwrap()
        .find_all();
    assert_eq!(hits.len(), 2);
}

#[test]
fn true_and_false_predicates() {
    let (group, table, keys) = people_fixture();
    assert_eq!(group.query(table, "TRUEPREDICATE").unwrap().count(), keys.len());
    assert_eq!(group.query(table, "FALSEPREDICATE").unwrap().count(), 0);
}

#[test]
fn comparison_is_symmetric() {
    let (group, table, _) = people_fixture();
    let left = group.query(table, "age == 20").unwrap().find_all();
    let right = group.query(table, "20 == age").unwrap().find_all();
    assert_eq!(left, right);

    let less = group.query(table, "age < 25").unwrap().find_all();
    let greater = group.query(table, "25 > age").unwrap().find_all();
    assert_eq!(less, greater);
}

#[test]
fn null_equality_on_nullable_column() {
    let (mut group, table, _) = people_fixture();
    let t = group.table_mut(table);
    t.create_object();

    let hits = group.query(table, "name == NULL").unwrap().find_all();
    assert_eq!(hits.len(), 1);
    let hits = group.query(table, "name != NULL").unwrap().find_all();
    assert_eq!(hits.len(), 3);
}

#[test]
fn aggregate_on_int_list() {
    let mut group = Group::new();
    let table = group.add_table("class_Game");
    let scores = group.table_mut(table).add_list_column("scores", DataType::Int);

    let a = group.table_mut(table).create_object();
    let b = group.table_mut(table).create_object();
    group
        .table_mut(table)
        .set_list(a, scores, vec![Value::Int(3), Value::Int(4)])
        .unwrap();
    group
        .table_mut(table)
        .set_list(b, scores, vec![Value::Int(6), Value::Int(5)])
        .unwrap();

    let hits = group.query(table, "scores.@sum > 10").unwrap().find_all();
    assert_eq!(hits, vec![b]);

    let hits = group.query(table, "scores.@max == 6").unwrap().find_all();
    assert_eq!(hits, vec![b]);

    let hits = group.query(table, "scores.@avg < 4").unwrap().find_all();
    assert_eq!(hits, vec![a]);

    let hits = group.query(table, "scores.@size == 2").unwrap().find_all();
    assert_eq!(hits.len(), 2);
}

#[test]
fn list_element_comparison_uses_any_semantics() {
    let mut group = Group::new();
    let table = group.add_table("class_Game");
    let scores = group.table_mut(table).add_list_column("scores", DataType::Int);
    let a = group.table_mut(table).create_object();
    group
        .table_mut(table)
        .set_list(a, scores, vec![Value::Int(1), Value::Int(9)])
        .unwrap();

    assert_eq!(group.query(table, "scores == 9").unwrap().count(), 1);
    assert_eq!(group.query(table, "scores == 5").unwrap().count(), 0);
    assert_eq!(group.query(table, "ALL scores > 0").unwrap().count(), 1);
    assert_eq!(group.query(table, "ALL scores > 5").unwrap().count(), 0);
    assert_eq!(group.query(table, "NONE scores == 3").unwrap().count(), 1);
}

#[test]
fn ordering_sort_and_limit() {
    let mut group = Group::new();
    let table = group.add_table("class_Person");
    let name = group.table_mut(table).add_column("name", DataType::String, true);
    for n in ["b", "a", "c"] {
        let obj = group.table_mut(table).create_object();
        group
            .table_mut(table)
            .set(obj, name, Value::String(n.into()))
            .unwrap();
    }

    let hits = group
        .query(table, "TRUEPREDICATE SORT(name ASC) LIMIT(2)")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["a", "b"]);

    let hits = group
        .query(table, "TRUEPREDICATE SORT(name DESC)")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["c", "b", "a"]);
}

#[test]
fn ordering_distinct() {
    let mut group = Group::new();
    let table = group.add_table("class_Person");
    let name = group.table_mut(table).add_column("name", DataType::String, true);
    for n in ["x", "y", "x", "y", "z"] {
        let obj = group.table_mut(table).create_object();
        group
            .table_mut(table)
            .set(obj, name, Value::String(n.into()))
            .unwrap();
    }

    let hits = group
        .query(table, "TRUEPREDICATE DISTINCT(name)")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, table, &hits), vec!["x", "y", "z"]);
}

fn owners_fixture() -> (Group, TableKey, TableKey) {
    let mut group = Group::new();
    let person = group.add_table("class_Person");
    let dog = group.add_table("class_Dog");

    let pname = group.table_mut(person).add_column("name", DataType::String, true);
    let dname = group.table_mut(dog).add_column("name", DataType::String, true);
    let age = group.table_mut(dog).add_column("age", DataType::Int, false);
    let owner = group.table_mut(dog).add_link_column("owner", person, false);
    let dogs = group.table_mut(person).add_link_column("dogs", dog, true);

    let alice = group.table_mut(person).create_object();
    let bob = group.table_mut(person).create_object();
    group
        .table_mut(person)
        .set(alice, pname, Value::String("alice".into()))
        .unwrap();
    group
        .table_mut(person)
        .set(bob, pname, Value::String("bob".into()))
        .unwrap();

    let rex = group.table_mut(dog).create_object();
    let ace = group.table_mut(dog).create_object();
    let ivy = group.table_mut(dog).create_object();
    for (d, n, a) in [(rex, "rex", 7), (ace, "ace", 2), (ivy, "ivy", 11)] {
        group
            .table_mut(dog)
            .set(d, dname, Value::String(n.into()))
            .unwrap();
        group.table_mut(dog).set(d, age, Value::Int(a)).unwrap();
    }
    group.table_mut(dog).set_links(rex, owner, vec![alice]).unwrap();
    group.table_mut(dog).set_links(ace, owner, vec![alice]).unwrap();
    group.table_mut(dog).set_links(ivy, owner, vec![bob]).unwrap();
    group
        .table_mut(person)
        .set_links(alice, dogs, vec![rex, ace])
        .unwrap();
    group.table_mut(person).set_links(bob, dogs, vec![ivy]).unwrap();

    (group, person, dog)
}

#[test]
fn forward_link_traversal() {
    let (group, _, dog) = owners_fixture();
    let hits = group.query(dog, "owner.name == 'alice'").unwrap().find_all();
    assert_eq!(hits.len(), 2);
}

#[test]
fn link_count_post_op() {
    let (group, person, _) = owners_fixture();
    let hits = group.query(person, "dogs.@count == 2").unwrap().find_all();
    assert_eq!(names_of(&group, person, &hits), vec!["alice"]);
}

#[test]
fn link_aggregate_over_property() {
    let (group, person, _) = owners_fixture();
    let hits = group.query(person, "dogs.@max.age > 10").unwrap().find_all();
    assert_eq!(names_of(&group, person, &hits), vec!["bob"]);
    let hits = group.query(person, "dogs.@sum.age == 9").unwrap().find_all();
    assert_eq!(names_of(&group, person, &hits), vec!["alice"]);
}

#[test]
fn backlink_traversal() {
    let (group, person, _) = owners_fixture();
    let hits = group
        .query(person, "@links.class_Dog.owner.name == 'ivy'")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, person, &hits), vec!["bob"]);

    // the class_ prefix may be omitted in the query text
    let hits = group
        .query(person, "@links.Dog.owner.@count == 2")
        .unwrap()
        .find_all();
    assert_eq!(names_of(&group, person, &hits), vec!["alice"]);
}

#[test]
fn unknown_backlink_column_is_rejected() {
    let (group, person, _) = owners_fixture();
    let err = group
        .query(person, "@links.Dog.nope.name == 'x'")
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::UnknownProperty(_))
    ));
}

#[test]
fn sort_through_links() {
    let (group, _, dog) = owners_fixture();
    let hits = group
        .query(dog, "TRUEPREDICATE SORT(owner.name ASC, age DESC)")
        .unwrap()
        .find_all();
    let name = group.table(dog).column_key("name").unwrap();
    let names: Vec<String> = hits
        .iter()
        .map(|&k| match group.table(dog).get(k, name).unwrap() {
            refdb::table::Cell::Scalar(Value::String(s)) => s.clone(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(names, vec!["rex", "ace", "ivy"]);
}

#[test]
fn timestamp_literals_compare() {
    let mut group = Group::new();
    let table = group.add_table("class_Event");
    let at = group.table_mut(table).add_column("at", DataType::Timestamp, false);

    let early = group.table_mut(table).create_object();
    let late = group.table_mut(table).create_object();
    group
        .table_mut(table)
        .set(early, at, Value::Timestamp(Timestamp::new(1_000, 0).unwrap()))
        .unwrap();
    group
        .table_mut(table)
        .set(late, at, Value::Timestamp(Timestamp::new(1_600_000_000, 0).unwrap()))
        .unwrap();

    let hits = group.query(table, "at > T1500:0").unwrap().find_all();
    assert_eq!(hits, vec![late]);

    let hits = group
        .query(table, "at < 2024-01-15T13:45:30")
        .unwrap()
        .find_all();
    assert_eq!(hits.len(), 2);
}

#[test]
fn arguments_substitute_like_literals() {
    let (group, table, _) = people_fixture();
    let args = MixedArguments::new(vec![
        Value::Int(15),
        Value::String("Foobar".into()),
    ]);
    let by_args = group
        .query_with_args(table, "age > $0 && name == $1", &args)
        .unwrap()
        .find_all();
    let by_literals = group
        .query(table, "age > 15 && name == 'Foobar'")
        .unwrap()
        .find_all();
    assert_eq!(by_args, by_literals);
    assert_eq!(by_args.len(), 1);
}

#[test]
fn invalid_predicate_carries_query_text() {
    let (group, table, _) = people_fixture();
    let err = group.query(table, "age >").unwrap_err();
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::InvalidPredicate { query, .. }) => assert_eq!(query, "age >"),
        other => panic!("expected InvalidPredicate, got {:?}", other),
    }
}

#[test]
fn unknown_property_in_predicate() {
    let (group, table, _) = people_fixture();
    let err = group.query(table, "salary == 1").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::UnknownProperty(_))
    ));
}

#[test]
fn binary_columns_support_size_and_equality() {
    let mut group = Group::new();
    let table = group.add_table("class_Blob");
    let data = group.table_mut(table).add_column("data", DataType::Binary, true);

    let small = group.table_mut(table).create_object();
    let large = group.table_mut(table).create_object();
    group
        .table_mut(table)
        .set(small, data, Value::Binary(b"ab".to_vec()))
        .unwrap();
    group
        .table_mut(table)
        .set(large, data, Value::Binary(b"abcdef".to_vec()))
        .unwrap();

    let hits = group.query(table, "data.@size > 2").unwrap().find_all();
    assert_eq!(hits, vec![large]);

    // B64"YWI=" is "ab"
    let hits = group.query(table, "data == B64\"YWI=\"").unwrap().find_all();
    assert_eq!(hits, vec![small]);
}

#[test]
fn query_round_trips_through_canonical_printing() {
    let arena = bumpalo::Bump::new();
    for text in [
        "age > 42 && name ==[c] 'foo'",
        "NOT (a == 1 || b == 2)",
        "scores.@sum > 10",
        "TRUEPREDICATE SORT(name ASC, age DESC) DISTINCT(name) LIMIT(3)",
    ] {
        let parsed = refdb::query::parse(text, &arena).unwrap();
        let printed = format!("{}", parsed);
        let reparsed = refdb::query::parse(arena.alloc_str(&printed), &arena).unwrap();
        assert_eq!(parsed, reparsed, "canonical round trip failed for {:?}", text);
    }
}
