//! Integration tests for pipeline assembly, execution and worker shipping.
//!
//! These drive whole pipelines end to end: definition files through the
//! parser and validator, builder pipelines through the runner, and
//! definitions through `run_parallel`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rowflow_engine::config::{parser, validator};
use rowflow_engine::dsl::{from_rows, lit, r#ref, to_memory, to_output};
use rowflow_engine::load::SharedWriter;
use rowflow_engine::{
    run_parallel, ByEntries, ErrorPolicy, HashBuckets, LoadError, Loader, OutputConfig,
    OutputFormat, OutputLoader, Pipeline, PipelineDefinition, PipelineError, SerializationError,
    StageFailure, StageRegistry, StageSpec, StructureUnpack, TransformErrorKind,
};
use rowflow_types::{Entry, PartitionKey, Row, Rows, SortOrder, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/pipelines")
        .join(name)
}

fn math_rows() -> Rows {
    Rows::new(vec![
        Row::new(vec![Entry::integer("a", 100), Entry::integer("b", 200)]).unwrap(),
        Row::new(vec![Entry::integer("a", 1), Entry::integer("b", 5)]).unwrap(),
    ])
}

fn ids(n: i64) -> Rows {
    (0..n)
        .map(|i| Row::new(vec![Entry::integer("id", i), Entry::integer("group", i % 3)]).unwrap())
        .collect()
}

fn int(row: &Row, name: &str) -> i64 {
    match row.get(name).unwrap().value() {
        Value::Integer(v) => *v,
        other => panic!("expected integer for {name}, got {other:?}"),
    }
}

/// Loader that fails on chosen batches and/or on finalize.
struct Faulty {
    fail_batches: Vec<usize>,
    fail_finalize: bool,
    seen: usize,
    finalized: Arc<Mutex<usize>>,
}

impl Faulty {
    fn new(fail_batches: Vec<usize>, fail_finalize: bool) -> (Self, Arc<Mutex<usize>>) {
        let finalized = Arc::new(Mutex::new(0));
        let loader = Self {
            fail_batches,
            fail_finalize,
            seen: 0,
            finalized: Arc::clone(&finalized),
        };
        (loader, finalized)
    }
}

#[async_trait]
impl Loader for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn load(&mut self, _rows: Rows) -> Result<(), LoadError> {
        let batch = self.seen;
        self.seen += 1;
        if self.fail_batches.contains(&batch) {
            return Err(LoadError::constraint(format!("batch {batch} rejected")));
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), LoadError> {
        *self.finalized.lock().unwrap() += 1;
        if self.fail_finalize {
            return Err(LoadError::unreachable("sink went away"));
        }
        Ok(())
    }

    fn to_spec(&self) -> Result<StageSpec, SerializationError> {
        Err(SerializationError::NotSerializable("faulty".into()))
    }
}

#[tokio::test]
async fn test_math_example() {
    let (echo, echoed) = to_memory();
    let (sink, loaded) = to_memory();
    let result = Pipeline::builder()
        .read(from_rows(math_rows()))
        .echo(echo)
        .with_entry("c", r#ref("a").plus("b"))
        .with_entry("d", r#ref("b").minus("a"))
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let rows = loaded.rows();
    assert_eq!(rows.len(), 2);
    let first = rows.first().unwrap();
    assert_eq!(first.names(), vec!["a", "b", "c", "d"]);
    assert_eq!(int(first, "c"), 300);
    assert_eq!(int(first, "d"), 100);

    assert_eq!(echoed.rows(), math_rows());
    assert_eq!(result.rows_extracted, 2);
    assert_eq!(result.total_rows_loaded(), 2);
    assert_eq!(result.rows_loaded(), vec![("memory", 2)]);
}

#[tokio::test]
async fn test_math_example_renders_table() {
    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let writer: SharedWriter = buffer.clone();
    Pipeline::builder()
        .read(from_rows(math_rows()))
        .with_entry("c", r#ref("a").plus("b"))
        .write(to_output(None).with_writer(writer))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let out = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(out.contains("|   a |   b |   c |"));
    assert!(out.contains("| 100 | 200 | 300 |"));
    assert!(out.ends_with("2 rows\n"));
}

#[tokio::test]
async fn test_write_through_sees_batch_at_its_position() {
    let (early, early_rows) = to_memory();
    let (late, late_rows) = to_memory();
    Pipeline::builder()
        .read(from_rows(math_rows()))
        .write(early)
        .with_entry("c", r#ref("a").times(lit(2)))
        .filter(r#ref("c").gt(lit(10)))
        .write(late)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let early = early_rows.rows();
    assert_eq!(early.len(), 2);
    assert!(early.iter().all(|r| !r.has("c")));
    let late = late_rows.rows();
    assert_eq!(late.len(), 1);
    assert_eq!(int(late.first().unwrap(), "c"), 200);
}

#[tokio::test]
async fn test_batches_keep_order_across_steps() {
    let (sink, handle) = to_memory();
    Pipeline::builder()
        .batch_size(4)
        .read(from_rows(ids(10)))
        .sort_by("id", SortOrder::Desc)
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let batches = handle.batches();
    assert_eq!(batches.len(), 3);
    let firsts: Vec<i64> = batches.iter().map(|b| int(b.first().unwrap(), "id")).collect();
    assert_eq!(firsts, vec![3, 7, 9]);
}

#[tokio::test]
async fn test_load_failure_stops_run_and_finalizes_every_loader() {
    let (faulty, faulty_finalized) = Faulty::new(vec![1], false);
    let (sink, handle) = to_memory();
    let err = Pipeline::builder()
        .batch_size(2)
        .read(from_rows(ids(6)))
        .write(faulty)
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    match &err {
        PipelineError::Stage {
            stage,
            batch_index,
            failure: StageFailure::Load(load),
        } => {
            assert_eq!(stage, "faulty");
            assert_eq!(*batch_index, 1);
            assert_eq!(load.code, LoadError::CONSTRAINT);
        }
        other => panic!("unexpected error {other}"),
    }
    // Batch 1 never reached the second loader and batch 2 was never pulled.
    assert_eq!(handle.batches().len(), 1);
    assert_eq!(*faulty_finalized.lock().unwrap(), 1);
    assert_eq!(handle.finalize_count(), 1);
}

#[tokio::test]
async fn test_finalize_failure_keeps_primary_error() {
    let (faulty, _) = Faulty::new(vec![0], true);
    let err = Pipeline::builder()
        .read(from_rows(ids(3)))
        .write(faulty)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::WithFinalize { .. }));
    assert!(matches!(err.stage_failure(), Some(StageFailure::Load(_))));
    assert_eq!(err.finalize_errors().len(), 1);
    assert_eq!(err.finalize_errors()[0].loader, "faulty");
}

#[tokio::test]
async fn test_finalize_failure_alone_fails_run() {
    let (faulty, finalized) = Faulty::new(vec![], true);
    let err = Pipeline::builder()
        .read(from_rows(ids(3)))
        .write(faulty)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(err.primary().is_none());
    assert_eq!(err.finalize_errors()[0].error.code, LoadError::UNREACHABLE);
    assert_eq!(*finalized.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_load_skip_policy_continues() {
    let (faulty, _) = Faulty::new(vec![0, 2], false);
    let (sink, handle) = to_memory();
    let result = Pipeline::builder()
        .batch_size(1)
        .read(from_rows(ids(4)))
        .write_with_policy(faulty, ErrorPolicy::Skip)
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(handle.rows().len(), 4);
    assert_eq!(result.steps[0].failures_skipped, 2);
    assert_eq!(result.steps[0].rows_loaded, 2);
    assert_eq!(result.rows_loaded(), vec![("faulty", 2), ("memory", 4)]);
}

#[tokio::test]
async fn test_diagnostic_failures_never_fail_run() {
    let (faulty, finalized) = Faulty::new(vec![0], true);
    let (sink, handle) = to_memory();
    let result = Pipeline::builder()
        .read(from_rows(ids(2)))
        .echo(faulty)
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(handle.rows().len(), 2);
    assert_eq!(*finalized.lock().unwrap(), 1);
    assert_eq!(result.rows_loaded(), vec![("memory", 2)]);
}

#[tokio::test]
async fn test_transform_error_is_fatal() {
    let (sink, handle) = to_memory();
    let err = Pipeline::builder()
        .read(from_rows(math_rows()))
        .with_entry("z", r#ref("missing").plus(1))
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap_err();

    match err.stage_failure() {
        Some(StageFailure::Transform(e)) => {
            assert_eq!(e.transformer, "with_entry");
            assert!(matches!(e.kind, TransformErrorKind::Eval(_)));
        }
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(handle.rows().is_empty());
    assert_eq!(handle.finalize_count(), 1);
}

#[tokio::test]
async fn test_partitioned_write_loads_each_group() {
    let (sink, handle) = to_memory();
    Pipeline::builder()
        .read(from_rows(ids(7)))
        .write_partitioned(sink, ByEntries::new(["group"]))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let keys: Vec<String> = handle.keys().iter().map(|k| k.as_str().to_string()).collect();
    assert_eq!(keys, vec!["group=0", "group=1", "group=2"]);
    let sizes: Vec<usize> = handle.batches().iter().map(Rows::len).collect();
    assert_eq!(sizes, vec![3, 2, 2]);
}

#[tokio::test]
async fn test_limit_spans_batches() {
    let (sink, handle) = to_memory();
    Pipeline::builder()
        .batch_size(3)
        .read(from_rows(ids(10)))
        .limit(4)
        .write(sink)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let rows = handle.rows();
    assert_eq!(rows.len(), 4);
    assert_eq!(int(rows.iter().last().unwrap(), "id"), 3);
}

#[test]
fn test_every_builtin_stage_survives_definition_roundtrip() {
    let pipeline = Pipeline::builder()
        .name("all_stages")
        .batch_size(7)
        .on_extract_error(ErrorPolicy::Skip)
        .read(from_rows(math_rows()).with_batch_size(1))
        .echo(to_output(Some(5)))
        .with_entry("c", r#ref("a").plus("b").is_not_null())
        .filter(r#ref("a").gt_eq(0).and(r#ref("b").not_eq(lit("x")).not()))
        .transform(StructureUnpack::new("s").with_prefix("s_").dropping_source())
        .rename("a", "alpha")
        .select(["alpha", "b"])
        .drop(["b"])
        .sort_by("alpha", SortOrder::Asc)
        .limit(10)
        .write_partitioned(
            OutputLoader::new(OutputConfig {
                truncate: None,
                format: OutputFormat::Json,
            }),
            HashBuckets::new(["alpha"], 4),
        )
        .write_with_policy(to_output(None), ErrorPolicy::Skip)
        .build()
        .unwrap();

    let definition = pipeline.to_definition().unwrap();
    let decoded = PipelineDefinition::from_bytes(&definition.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, definition);

    let rebuilt = decoded.build(&StageRegistry::with_builtins()).unwrap();
    assert_eq!(rebuilt.step_names(), pipeline.step_names());
    assert_eq!(rebuilt.to_definition().unwrap(), definition);
}

#[test]
fn test_parse_and_validate_fixture_pipeline() {
    std::env::set_var("ROWFLOW_TEST_BATCH_SIZE", "1");
    let definition = parser::parse_definition(&fixture("math.yaml")).unwrap();
    std::env::remove_var("ROWFLOW_TEST_BATCH_SIZE");

    assert_eq!(definition.name, "math");
    assert_eq!(definition.batch_size, 1);
    assert_eq!(definition.steps.len(), 4);
    validator::validate_definition(&definition, &StageRegistry::with_builtins())
        .expect("Validation should pass");
}

#[test]
fn test_parse_and_validate_invalid_fixture() {
    let definition = parser::parse_definition(&fixture("invalid.yaml")).unwrap();
    let err = validator::validate_definition(&definition, &StageRegistry::with_builtins())
        .unwrap_err()
        .to_string();

    assert!(err.contains("Pipeline name must not be empty"));
    assert!(err.contains("batch_size must be at least 1"));
    assert!(err.contains("unknown extractor kind 'kafka'"));
    assert!(err.contains("steps[0]: invalid transformer"));
    assert!(err.contains("hash_buckets needs at least 1 bucket"));
}

#[tokio::test]
async fn test_run_parallel_shards_are_disjoint() {
    let definition = Pipeline::builder()
        .name("sharded")
        .batch_size(2)
        .read(from_rows(ids(11)))
        .filter(r#ref("id").gt_eq(0))
        .write(to_output(None).with_writer(Arc::new(Mutex::new(std::io::sink()))))
        .build()
        .unwrap()
        .to_definition()
        .unwrap();

    let results = run_parallel(&definition, Arc::new(StageRegistry::with_builtins()), 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let workers: Vec<u32> = results.iter().map(|r| r.worker_index).collect();
    assert_eq!(workers, vec![0, 1, 2]);
    let extracted: Vec<u64> = results.iter().map(|r| r.rows_extracted).collect();
    assert_eq!(extracted, vec![4, 4, 3]);
    let loaded: u64 = results.iter().map(|r| r.total_rows_loaded()).sum();
    assert_eq!(loaded, 11);
}

#[tokio::test]
async fn test_run_parallel_reports_worker_failure() {
    let definition = Pipeline::builder()
        .read(from_rows(math_rows()))
        .with_entry("z", r#ref("nope"))
        .write(to_output(None))
        .build()
        .unwrap()
        .to_definition()
        .unwrap();

    let err = run_parallel(&definition, Arc::new(StageRegistry::with_builtins()), 2)
        .await
        .unwrap_err();
    assert!(matches!(err.stage_failure(), Some(StageFailure::Transform(_))));

    let err = run_parallel(&definition, Arc::new(StageRegistry::with_builtins()), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Build(_)));
}

#[tokio::test]
async fn test_partition_keys_reach_partition_aware_loader() {
    struct KeyRecorder(Arc<Mutex<Vec<PartitionKey>>>);

    #[async_trait]
    impl Loader for KeyRecorder {
        fn name(&self) -> &str {
            "keys"
        }

        async fn load(&mut self, _rows: Rows) -> Result<(), LoadError> {
            Err(LoadError::internal("load_partition should be used"))
        }

        async fn load_partition(&mut self, key: &PartitionKey, _rows: Rows) -> Result<(), LoadError> {
            self.0.lock().unwrap().push(key.clone());
            Ok(())
        }

        fn to_spec(&self) -> Result<StageSpec, SerializationError> {
            Err(SerializationError::NotSerializable("keys".into()))
        }
    }

    let keys = Arc::new(Mutex::new(Vec::new()));
    Pipeline::builder()
        .read(from_rows(ids(5)))
        .write_partitioned(KeyRecorder(Arc::clone(&keys)), HashBuckets::new(["id"], 2))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let keys = keys.lock().unwrap();
    assert!(!keys.is_empty() && keys.len() <= 2);
    assert!(keys.iter().all(|k| k.as_str().starts_with("bucket=")));
}
