//! Query codec property tests

#[cfg(test)]
mod tests {
    use crud_admin::query::{decode, encode, matches_all};
    use crud_admin::{FilterOp, Filters, Predicate, Query, Sort};
    use proptest::prelude::*;
    use serde_json::json;

    fn field() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_]{0,10}"
    }

    fn op() -> impl Strategy<Value = FilterOp> {
        prop::sample::select(FilterOp::ALL.to_vec())
    }

    fn sort() -> impl Strategy<Value = Sort> {
        (field(), any::<bool>()).prop_map(|(f, desc)| if desc { Sort::desc(f) } else { Sort::asc(f) })
    }

    fn query() -> impl Strategy<Value = Query> {
        (
            prop::collection::btree_map(field(), (op(), "[ -~]{0,16}"), 0..4),
            prop::collection::vec(sort(), 0..4),
            0usize..10_000,
            1usize..500,
        )
            .prop_map(|(filters, sorts, offset, limit)| Query {
                filters: filters
                    .into_iter()
                    .map(|(f, (op, value))| (f, Predicate::new(op, value)))
                    .collect(),
                sorts,
                offset,
                limit,
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(q in query()) {
            let params = encode(&q);
            prop_assert_eq!(decode(&params), Ok(q));
        }

        #[test]
        fn shape_key_ignores_paging(q in query(), offset in 0usize..100, limit in 1usize..100) {
            let moved = Query { offset, limit, ..q.clone() };
            prop_assert_eq!(q.shape_key(), moved.shape_key());
        }

        #[test]
        fn empty_filters_match_everything(name in "[ -~]{0,16}") {
            let record = json!({"name": name});
            prop_assert!(matches_all(&record, &Filters::new()));
        }
    }
}
