use proptest::prelude::*;
use rowflow_types::{Entry, PartitionKey, Row, Rows, SortOrder, Value};

fn arb_rows() -> impl Strategy<Value = Rows> {
    prop::collection::vec((0_i64..5, 0_i64..1000), 0..40).prop_map(|pairs| {
        pairs
            .into_iter()
            .enumerate()
            .map(|(seq, (bucket, amount))| {
                Row::new(vec![
                    Entry::integer("seq", i64::try_from(seq).unwrap()),
                    Entry::integer("bucket", bucket),
                    Entry::integer("amount", amount),
                ])
                .unwrap()
            })
            .collect()
    })
}

fn int(row: &Row, name: &str) -> i64 {
    match row.get(name).unwrap().value() {
        Value::Integer(v) => *v,
        other => panic!("expected integer, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn map_identity_preserves_batch(rows in arb_rows()) {
        prop_assert_eq!(rows.map(Clone::clone), rows);
    }

    #[test]
    fn filter_never_grows_and_keeps_only_matches(rows in arb_rows(), threshold in 0_i64..1000) {
        let filtered = rows.filter(|r| int(r, "amount") >= threshold);
        prop_assert!(filtered.len() <= rows.len());
        prop_assert!(filtered.iter().all(|r| int(r, "amount") >= threshold));
    }

    #[test]
    fn sort_is_stable(rows in arb_rows()) {
        let sorted = rows.sort_by_entry("bucket", SortOrder::Asc);
        prop_assert_eq!(sorted.len(), rows.len());
        for pair in sorted.iter().collect::<Vec<_>>().windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(int(a, "bucket") <= int(b, "bucket"));
            if int(a, "bucket") == int(b, "bucket") {
                prop_assert!(int(a, "seq") < int(b, "seq"));
            }
        }
    }

    #[test]
    fn chunks_concatenate_back(rows in arb_rows(), size in 1_usize..10) {
        let chunks = rows.chunk_by(size);
        prop_assert!(chunks.iter().all(|c| c.len() <= size && !c.is_empty()));
        let rebuilt = chunks.iter().fold(Rows::empty(), |acc, c| acc.merge(c));
        prop_assert_eq!(rebuilt, rows);
    }

    #[test]
    fn partitions_union_to_source(rows in arb_rows()) {
        let parts = rows.partition_by(|r| PartitionKey::from_entries(r, &["bucket".to_string()]));
        let total: usize = parts.iter().map(|p| p.rows.len()).sum();
        prop_assert_eq!(total, rows.len());

        let mut seqs: Vec<i64> = parts
            .iter()
            .flat_map(|p| p.rows.iter().map(|r| int(r, "seq")))
            .collect();
        for part in &parts {
            let inner: Vec<i64> = part.rows.iter().map(|r| int(r, "seq")).collect();
            let mut sorted = inner.clone();
            sorted.sort_unstable();
            prop_assert_eq!(inner, sorted);
        }
        seqs.sort_unstable();
        let expected: Vec<i64> = rows.iter().map(|r| int(r, "seq")).collect();
        prop_assert_eq!(seqs, expected);
    }
}
