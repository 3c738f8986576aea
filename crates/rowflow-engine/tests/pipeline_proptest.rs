use proptest::prelude::*;
use rowflow_engine::dsl::{from_rows, lit, r#ref, to_memory};
use rowflow_engine::{Pipeline, PipelineResult};
use rowflow_types::{Entry, Row, Rows, Value};

fn arb_rows() -> impl Strategy<Value = Rows> {
    prop::collection::vec(-500_i64..500, 0..60).prop_map(|amounts| {
        amounts
            .into_iter()
            .enumerate()
            .map(|(seq, amount)| {
                Row::new(vec![
                    Entry::integer("seq", i64::try_from(seq).unwrap()),
                    Entry::integer("amount", amount),
                ])
                .unwrap()
            })
            .collect()
    })
}

fn seqs(rows: &Rows) -> Vec<i64> {
    rows.iter()
        .map(|r| match r.get("seq").unwrap().value() {
            Value::Integer(v) => *v,
            other => panic!("expected integer, got {other:?}"),
        })
        .collect()
}

fn run(pipeline: Pipeline) -> PipelineResult {
    futures::executor::block_on(pipeline.run()).unwrap()
}

proptest! {
    #[test]
    fn filter_output_is_independent_of_batch_size(
        rows in arb_rows(),
        threshold in -500_i64..500,
        batch_size in 1_usize..17,
    ) {
        let (sink, handle) = to_memory();
        let result = run(
            Pipeline::builder()
                .batch_size(batch_size)
                .read(from_rows(rows.clone()))
                .filter(r#ref("amount").gt_eq(lit(threshold)))
                .write(sink)
                .build()
                .unwrap(),
        );

        let expected: Vec<i64> = seqs(&rows.filter(|r| {
            matches!(r.get("amount").unwrap().value(), Value::Integer(v) if *v >= threshold)
        }));
        prop_assert_eq!(seqs(&handle.rows()), expected);
        prop_assert_eq!(result.rows_extracted, rows.len() as u64);
        prop_assert!(result.total_rows_loaded() <= result.rows_extracted);
    }

    #[test]
    fn limit_passes_a_prefix_of_the_stream(
        rows in arb_rows(),
        limit in 0_usize..80,
        batch_size in 1_usize..9,
    ) {
        let (sink, handle) = to_memory();
        run(
            Pipeline::builder()
                .batch_size(batch_size)
                .read(from_rows(rows.clone()))
                .limit(limit)
                .write(sink)
                .build()
                .unwrap(),
        );

        let loaded = seqs(&handle.rows());
        prop_assert_eq!(loaded.len(), limit.min(rows.len()));
        prop_assert_eq!(loaded, seqs(&rows.take(limit)));
    }

    #[test]
    fn derived_entry_matches_row_arithmetic(rows in arb_rows(), offset in -1000_i64..1000) {
        let (sink, handle) = to_memory();
        run(
            Pipeline::builder()
                .read(from_rows(rows))
                .with_entry("shifted", r#ref("amount").plus(lit(offset)))
                .write(sink)
                .build()
                .unwrap(),
        );

        for row in handle.rows().iter() {
            let amount = row.get("amount").unwrap().value().clone();
            let shifted = row.get("shifted").unwrap().value().clone();
            match (amount, shifted) {
                (Value::Integer(a), Value::Integer(s)) => prop_assert_eq!(s, a + offset),
                other => prop_assert!(false, "unexpected values {:?}", other),
            }
        }
    }
}
