//! SQL generation tests across dialects and conflict policies

use batchflow::prelude::*;
use tokio_util::sync::CancellationToken;

fn rows() -> Vec<RowData> {
    vec![
        RowData::from([
            ("id".to_string(), Value::Int64(1)),
            ("name".to_string(), Value::String("a".into())),
        ]),
        RowData::from([
            ("id".to_string(), Value::Int64(2)),
            ("name".to_string(), Value::String("b".into())),
        ]),
    ]
}

fn generate(driver: &dyn SqlDriver, policy: ConflictPolicy) -> (String, Vec<Value>) {
    let schema = Schema::relational("users", policy, ["id", "name"]);
    driver
        .generate_insert_sql(&CancellationToken::new(), &schema, &rows())
        .expect("generate")
}

#[test]
fn test_dialect_matrix() {
    let cases: [(&dyn SqlDriver, ConflictPolicy, &str); 11] = [
        (&MySqlDriver, ConflictPolicy::Insert, "INSERT INTO users (id, name) VALUES"),
        (&MySqlDriver, ConflictPolicy::Ignore, "INSERT IGNORE INTO users"),
        (&MySqlDriver, ConflictPolicy::Replace, "REPLACE INTO users"),
        (&MySqlDriver, ConflictPolicy::Update, "ON DUPLICATE KEY UPDATE"),
        (&PostgresDriver, ConflictPolicy::Insert, "INSERT INTO users (id, name) VALUES"),
        (&PostgresDriver, ConflictPolicy::Ignore, "ON CONFLICT DO NOTHING"),
        (&PostgresDriver, ConflictPolicy::Update, "ON CONFLICT (id) DO UPDATE SET"),
        (&SqliteDriver, ConflictPolicy::Insert, "INSERT INTO users (id, name) VALUES"),
        (&SqliteDriver, ConflictPolicy::Ignore, "INSERT OR IGNORE INTO users"),
        (&SqliteDriver, ConflictPolicy::Replace, "INSERT OR REPLACE INTO users"),
        (&SqliteDriver, ConflictPolicy::Update, "ON CONFLICT DO UPDATE SET"),
    ];

    for (driver, policy, want) in cases {
        let (sql, args) = generate(driver, policy);
        assert!(
            sql.contains(want),
            "{} {:?}: {sql:?} does not contain {want:?}",
            driver.name(),
            policy
        );
        assert_eq!(args.len(), 4, "{} {:?}", driver.name(), policy);
    }
}

#[test]
fn test_mysql_ignore_exact_shape() {
    // Two rows on Schema("users", [id, name], Ignore) with the MySQL dialect
    let (sql, args) = generate(&MySqlDriver, ConflictPolicy::Ignore);
    assert!(sql.contains("INSERT IGNORE INTO users"));
    assert_eq!(
        args,
        vec![
            Value::Int64(1),
            Value::String("a".into()),
            Value::Int64(2),
            Value::String("b".into()),
        ]
    );
}

#[test]
fn test_postgres_update_exact_shape() {
    // Same rows, PostgreSQL dialect, UpdateConflict keyed on id
    let (sql, args) = generate(&PostgresDriver, ConflictPolicy::Update);
    assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET"));
    assert_eq!(
        args,
        vec![
            Value::Int64(1),
            Value::String("a".into()),
            Value::Int64(2),
            Value::String("b".into()),
        ]
    );
}

#[test]
fn test_argument_count_row_major() {
    // 3 columns x 4 rows = 12 arguments, in row-major order
    let schema = Schema::relational("t", ConflictPolicy::Insert, ["a", "b", "c"]);
    let rows: Vec<RowData> = (0..4_i64)
        .map(|i| {
            RowData::from([
                ("a".to_string(), Value::Int64(i)),
                ("b".to_string(), Value::Int64(i * 10)),
                ("c".to_string(), Value::Int64(i * 100)),
            ])
        })
        .collect();

    for driver in [&MySqlDriver as &dyn SqlDriver, &PostgresDriver, &SqliteDriver] {
        let (_, args) = driver
            .generate_insert_sql(&CancellationToken::new(), &schema, &rows)
            .unwrap();
        assert_eq!(args.len(), 12);
        assert_eq!(args[0], Value::Int64(0));
        assert_eq!(args[3], Value::Int64(1));
        assert_eq!(args[11], Value::Int64(300));
    }
}

#[test]
fn test_missing_columns_bound_as_null() {
    let schema = Schema::relational("t", ConflictPolicy::Insert, ["a", "b"]);
    let rows = vec![RowData::from([("a".to_string(), Value::Int64(1))])];

    let (_, args) = MySqlDriver
        .generate_insert_sql(&CancellationToken::new(), &schema, &rows)
        .unwrap();
    assert_eq!(args, vec![Value::Int64(1), Value::Null]);
}

#[test]
fn test_hundred_column_statement() {
    let columns: Vec<String> = (0..100).map(|i| format!("c{i}")).collect();
    let schema = Schema::relational("wide", ConflictPolicy::Insert, columns.clone());
    let mut row = RowData::new();
    for (i, column) in columns.iter().enumerate() {
        row.insert(column.clone(), Value::Int64(i as i64));
    }

    let (sql, args) = PostgresDriver
        .generate_insert_sql(&CancellationToken::new(), &schema, &[row])
        .unwrap();
    assert_eq!(args.len(), 100);
    assert!(sql.contains("$100"));
    assert!(!sql.contains("$101"));
}

#[test]
fn test_empty_rows_produce_empty_operations() {
    let schema = Schema::relational("users", ConflictPolicy::Ignore, ["id", "name"]);
    for driver in [&MySqlDriver as &dyn SqlDriver, &PostgresDriver, &SqliteDriver] {
        let (sql, args) = driver
            .generate_insert_sql(&CancellationToken::new(), &schema, &[])
            .unwrap();
        assert!(sql.is_empty());
        assert!(args.is_empty());
    }
}

#[test]
fn test_cancelled_token_returns_context_error() {
    let schema = Schema::relational("users", ConflictPolicy::Ignore, ["id", "name"]);
    let ctx = CancellationToken::new();
    ctx.cancel();

    for driver in [&MySqlDriver as &dyn SqlDriver, &PostgresDriver, &SqliteDriver] {
        let err = driver
            .generate_insert_sql(&ctx, &schema, &rows())
            .unwrap_err();
        assert!(err.is_cancelled(), "{}", driver.name());
    }
}
