use proptest::prelude::*;
use sql_coordinator::prelude::*;

fn db_type_strategy() -> impl Strategy<Value = DbType> {
    prop_oneof![
        Just(DbType::Int),
        Just(DbType::BigInt),
        Just(DbType::NVarChar),
        Just(DbType::Float),
        Just(DbType::Bit),
        Just(DbType::DateTime2),
    ]
}

fn value_strategy() -> impl Strategy<Value = DbValue> {
    prop_oneof![
        Just(DbValue::Null),
        any::<i64>().prop_map(DbValue::Int),
        any::<bool>().prop_map(DbValue::Bool),
        "[a-zA-Z0-9 ]{0,16}".prop_map(DbValue::Text),
        (-1.0e6..1.0e6_f64).prop_map(DbValue::Float),
    ]
}

proptest! {
    #[test]
    fn list_preserves_insertion_order(
        entries in prop::collection::vec(("[@:$]?[a-z_][a-z0-9_]{0,8}", value_strategy(), db_type_strategy()), 0..24)
    ) {
        let mut params = ParameterSet::new();
        for (name, value, db_type) in &entries {
            params.add(name, value.clone(), *db_type).unwrap();
        }
        prop_assert_eq!(params.len(), entries.len());
        for (param, (name, value, db_type)) in params.list().iter().zip(&entries) {
            prop_assert_eq!(param.name(), name.as_str());
            prop_assert_eq!(param.value(), value);
            prop_assert_eq!(param.db_type(), *db_type);
        }
    }

    #[test]
    fn blank_names_are_rejected(name in "[ \t]{0,6}", value in value_strategy()) {
        let mut params = ParameterSet::new();
        let err = params.add(&name, value, DbType::Int).unwrap_err();
        prop_assert!(err.is_invalid_argument());
        prop_assert!(params.is_empty());
    }
}

#[test]
fn absent_values_become_db_null() {
    let mut params = ParameterSet::new();
    params
        .add("@title", None::<String>, DbType::NVarChar)
        .unwrap()
        .add("@count", Some(3_i64), DbType::Int)
        .unwrap();
    assert_eq!(params.list()[0].value(), &DbValue::Null);
    assert_eq!(params.list()[1].value(), &DbValue::Int(3));
}

#[test]
fn clear_empties_for_reuse() {
    let mut params = ParameterSet::new();
    params.add("@a", 1_i64, DbType::Int).unwrap();
    params.add("@a", 2_i64, DbType::Int).unwrap();
    assert_eq!(params.len(), 2, "duplicates are kept");
    params.clear();
    assert!(params.is_empty());
    params.add_with_size("@b", "x", DbType::VarChar, 10).unwrap();
    assert_eq!(params.list()[0].size(), Some(10));
}
