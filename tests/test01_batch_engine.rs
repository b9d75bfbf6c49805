use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_batch::prelude::*;
use sql_batch::test_utils::{RecordedEvent, RecordingDriver};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn helper_with(driver: &RecordingDriver, tune: impl FnOnce(ConnectionDescriptor) -> ConnectionDescriptor) -> SqlHelper {
    init_tracing();
    let descriptor = ConnectionDescriptor::new("test", "Server=recording", Arc::new(driver.clone()))
        .expect("descriptor");
    SqlHelper::new(Arc::new(tune(descriptor)))
}

fn first_int(sets: &[ResultSet]) -> Option<i64> {
    sets.first()?.first_value()?.as_int().copied()
}

#[tokio::test]
async fn four_thousand_selects_need_two_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d);
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..4000i64 {
        let sink = Arc::clone(&seen);
        helper
            .add_query("SELECT * FROM T WHERE ID=@0", args![i])
            .on_result(move |_: &Command, sets: &[ResultSet], _: Option<&CallbackContext>| {
                sink.lock().unwrap().push((sets.len(), first_int(sets)));
            });
    }

    let all = helper.execute().await?;

    let trips = driver.round_trips();
    assert_eq!(trips.len(), 2);
    assert!(trips.iter().all(|t| t.parameters.len() == 2000 && t.reader));
    assert_eq!(all.len(), 4000);
    for (i, set) in all.iter().enumerate() {
        assert_eq!(first_int(std::slice::from_ref(set)), Some(i as i64));
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4000);
    assert!(seen.iter().enumerate().all(|(i, &(n, v))| n == 1 && v == Some(i as i64)));
    assert!(!driver.events().contains(&RecordedEvent::Begin));
    Ok(())
}

#[tokio::test]
async fn headers_are_replayed_into_every_chunk() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d.with_parameter_ceiling(4));
    helper.add_header("DECLARE @x AS BIGINT;", args![]);
    helper.add_header("SET @x = @0;", args![5]);
    for i in 0..6i64 {
        helper.add_query("SELECT * FROM T WHERE ID=@0 AND N=@x", args![i]);
    }

    helper.execute().await?;

    let trips = driver.round_trips();
    assert_eq!(trips.len(), 2);
    for trip in &trips {
        assert!(trip.sql.starts_with("DECLARE @x AS BIGINT;\nSET @x = @0Header1;\n"));
        assert!(trip.parameters.iter().any(|p| p.id() == "0Header1"));
        assert!(trip.parameters.len() <= 4);
    }
    assert!(trips[1].sql.contains("@0Command5 AND N=@x"));
    Ok(())
}

#[tokio::test]
async fn headers_with_same_placeholder_keep_their_own_values() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d);
    let seen: Arc<Mutex<Vec<(&'static str, Option<i64>)>>> = Arc::new(Mutex::new(Vec::new()));
    for (sql, tag, value) in [("SELECT @0 AS a;", "a", 1i64), ("SELECT @0 AS b;", "b", 2)] {
        let sink = Arc::clone(&seen);
        helper
            .add_header(sql, args![value])
            .on_result(move |_: &Command, sets: &[ResultSet], _: Option<&CallbackContext>| {
                sink.lock().unwrap().push((tag, first_int(sets)));
            });
    }
    helper.add_query("SELECT * FROM T WHERE ID=@0", args![3]);

    helper.execute().await?;

    assert_eq!(*seen.lock().unwrap(), vec![("a", Some(1)), ("b", Some(2))]);
    let trips = driver.round_trips();
    assert_eq!(trips.len(), 1);
    let ids: Vec<&str> = trips[0].parameters.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec!["0Header0", "0Header1", "0Command2"]);
    Ok(())
}

#[tokio::test]
async fn failed_chunk_rolls_back_and_skips_callbacks() {
    let driver = RecordingDriver::new().fail_round_trip(1);
    let mut helper = helper_with(&driver, |d| d.with_parameter_ceiling(1));
    let fired = Arc::new(Mutex::new(0usize));
    for i in 0..3i64 {
        let fired = Arc::clone(&fired);
        helper
            .add_query("INSERT INTO T (ID) VALUES (@0)", args![i])
            .on_result(move |_: &Command, _: &[ResultSet], _: Option<&CallbackContext>| {
                *fired.lock().unwrap() += 1;
            });
    }

    let err = helper.execute().await.unwrap_err();
    assert!(matches!(err, SqlBatchError::ExecutionError(_)));
    assert_eq!(*fired.lock().unwrap(), 0);

    let events = driver.events();
    let tail: Vec<&RecordedEvent> = events.iter().filter(|e| !matches!(e, RecordedEvent::RoundTrip(_))).collect();
    assert_eq!(
        tail,
        vec![&RecordedEvent::Connect, &RecordedEvent::Begin, &RecordedEvent::Rollback, &RecordedEvent::Close]
    );
    assert_eq!(driver.round_trips().len(), 2);
}

#[tokio::test]
async fn transaction_decision() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();

    let mut single = helper_with(&driver, |d| d);
    single.add_query("INSERT INTO T (ID) VALUES (@0)", args![1]);
    single.execute().await?;
    assert!(!driver.events().contains(&RecordedEvent::Begin));

    driver.reset();
    let mut pair = helper_with(&driver, |d| d);
    pair.add_query("INSERT INTO T (ID) VALUES (@0)", args![1]);
    pair.add_query("SELECT * FROM T", args![]);
    pair.execute().await?;
    let events = driver.events();
    assert_eq!(events[1], RecordedEvent::Begin);
    assert_eq!(events[events.len() - 2], RecordedEvent::Commit);

    driver.reset();
    let mut ddl = helper_with(&driver, |d| d);
    ddl.add_query("CREATE DATABASE Reports", args![]);
    ddl.add_query("INSERT INTO T (ID) VALUES (@0)", args![1]);
    ddl.execute().await?;
    assert!(!driver.events().contains(&RecordedEvent::Begin));
    Ok(())
}

#[tokio::test]
async fn connection_failures_are_retried() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new().fail_connects(2);
    let mut helper = helper_with(&driver, |d| d.with_retries(2));
    helper.add_query("SELECT 1", args![]);
    helper.execute().await?;
    assert_eq!(driver.connect_attempts(), 3);

    let stubborn = RecordingDriver::new().fail_connects(5);
    let mut helper = helper_with(&stubborn, |d| d.with_retries(1));
    helper.add_query("SELECT 1", args![]);
    let err = helper.execute().await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(stubborn.connect_attempts(), 2);
    assert!(stubborn.round_trips().is_empty());
    Ok(())
}

#[tokio::test]
async fn slow_chunk_times_out_and_cleans_up() {
    let driver = RecordingDriver::new().with_delay(Duration::from_secs(3));
    let mut helper = helper_with(&driver, |d| d.with_command_timeout(1));
    helper.add_query("UPDATE T SET A = 1", args![]);
    helper.add_query("UPDATE T SET B = 2", args![]);

    let err = helper.execute().await.unwrap_err();
    assert!(matches!(err, SqlBatchError::Timeout { seconds: 1 }));
    let events = driver.events();
    let cancel = events.iter().position(|e| *e == RecordedEvent::Cancel).expect("cancelled");
    let rollback = events.iter().position(|e| *e == RecordedEvent::Rollback).expect("rolled back");
    assert!(cancel < rollback);
    assert_eq!(events.last(), Some(&RecordedEvent::Close));
}

#[tokio::test]
async fn scalar_reads_first_row_or_default() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d);
    helper.add_query("UPDATE T SET A = 1", args![]);
    helper.add_query("SELECT * FROM T WHERE ID=@0", args![42]);
    assert_eq!(helper.execute_scalar::<i64>(0).await?, 42);

    helper.create_batch();
    helper.add_query("DELETE FROM T", args![]);
    assert_eq!(helper.execute_scalar::<i64>(7).await?, 7);

    helper.create_batch();
    helper.add_query("SELECT * FROM T WHERE NAME=@0", args!["bob"]);
    assert!(matches!(
        helper.execute_scalar::<i64>(0).await,
        Err(SqlBatchError::ConversionError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn handlers_get_their_own_sets_and_context() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d);
    let log: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    for (sql, tag) in [("SELECT * FROM A", "a"), ("UPDATE B SET X = 1", "b"), ("SELECT * FROM C", "c")] {
        let sink = Arc::clone(&log);
        helper
            .add_query(sql, args![])
            .on_result(move |_: &Command, sets: &[ResultSet], ctx: Option<&CallbackContext>| {
                let tag = ctx.and_then(|c| c.downcast_ref::<String>()).cloned().unwrap_or_default();
                sink.lock().unwrap().push((tag, sets.len()));
            })
            .with_context(Arc::new(tag.to_string()));
    }
    helper.add_query("", args![]);

    let all = helper.execute().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(
        *log.lock().unwrap(),
        vec![("a".to_string(), 1), ("b".to_string(), 0), ("c".to_string(), 1)]
    );
    assert_eq!(driver.round_trips()[0].sql.lines().count(), 3);
    Ok(())
}

#[tokio::test]
async fn display_and_plan_do_not_touch_the_database() {
    let driver = RecordingDriver::new();
    let mut helper = helper_with(&driver, |d| d);
    helper.add_query("SELECT * FROM T WHERE ID=@0", args![1]);
    helper.add_query("SELECT * FROM T WHERE ID=@0", args![10]);

    assert_eq!(format!("{helper}"), "SELECT * FROM T WHERE ID=1\nSELECT * FROM T WHERE ID=10");
    let plan = helper.batch().plan();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].parameters.len(), 2);
    assert!(driver.events().is_empty());
}

#[tokio::test]
async fn registry_shares_descriptors_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let registry = DescriptorRegistry::new();
    let settings = ConnectionSettings::from_json_str(
        r#"{ "connection_strings": { "Default": "Server=one;Command Timeout=9" }, "retries": { "Default": 4 } }"#,
    )?;
    let driver: Arc<dyn DbDriver> = Arc::new(RecordingDriver::new());

    let a = SqlHelper::from_registry(&registry, "Default", &settings, Arc::clone(&driver))?;
    let b = SqlHelper::from_registry(&registry, "Default", &settings, Arc::clone(&driver))?;
    assert!(Arc::ptr_eq(a.descriptor(), b.descriptor()));
    assert_eq!(a.descriptor().retries(), 4);
    assert_eq!(a.descriptor().command_timeout_secs(), 9);

    let literal = SqlHelper::from_registry(&registry, "Server=two", &settings, driver)?;
    assert_eq!(literal.descriptor().connection_string(), "Server=two");
    assert_eq!(registry.len(), 2);
    Ok(())
}
