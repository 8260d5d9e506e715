use proptest::prelude::*;
use ratesim_storage::{
    Adjacency, ConnectivityMatrix, Layout, MemoryBudget, OffsetMatrix, StorageError,
};
use std::collections::BTreeSet;

const LOW_ROW: u32 = 40;
const LOW_COL: u32 = 7;
const ROWS: u32 = 24;
const COLS: u32 = 18;

fn layout_strategy() -> impl Strategy<Value = Layout> {
    prop_oneof![Just(Layout::RowMajor), Just(Layout::ColumnMajor)]
}

/// Unique `(post, pre)` pairs inside the rank windows
fn pairs_strategy() -> impl Strategy<Value = BTreeSet<(u32, u32)>> {
    prop::collection::btree_set(
        (LOW_ROW..LOW_ROW + ROWS, LOW_COL..LOW_COL + COLS),
        0..120,
    )
}

fn build(pairs: &BTreeSet<(u32, u32)>, layout: Layout) -> (Adjacency<u32>, ConnectivityMatrix) {
    let adjacency = Adjacency::from_pairs(pairs.iter().copied());
    let mut matrix = ConnectivityMatrix::new(
        LOW_ROW,
        LOW_ROW + ROWS,
        LOW_COL,
        LOW_COL + COLS,
        layout,
    )
    .unwrap();
    matrix
        .init_from_adjacency(&adjacency, &MemoryBudget::Unlimited)
        .unwrap();
    (adjacency, matrix)
}

proptest! {
    #[test]
    fn decoded_rows_match_ingested_pre_ranks(pairs in pairs_strategy(), layout in layout_strategy()) {
        let (adjacency, matrix) = build(&pairs, layout);

        for (post, pres) in adjacency.dendrites() {
            let row = post - LOW_ROW;
            let decoded: BTreeSet<u32> = matrix
                .decode_column_indices(row)
                .unwrap()
                .map(|col| col + LOW_COL)
                .collect();
            let expected: BTreeSet<u32> = pres.iter().copied().collect();
            prop_assert_eq!(decoded, expected);
        }

        // rows never mentioned in the input stay empty
        for row in 0..ROWS {
            if !adjacency.post_ranks.contains(&(row + LOW_ROW)) {
                prop_assert_eq!(matrix.decode_column_indices(row).unwrap().count(), 0);
            }
        }
    }

    #[test]
    fn incoming_counts_sum_to_pair_count(pairs in pairs_strategy(), layout in layout_strategy()) {
        let (adjacency, matrix) = build(&pairs, layout);
        let counts = matrix.count_incoming_per_column().unwrap();

        prop_assert_eq!(counts.values().sum::<usize>(), adjacency.nb_synapses());
        prop_assert!(counts.values().all(|&c| c > 0));
        prop_assert!(counts.keys().all(|&rank| (LOW_COL..LOW_COL + COLS).contains(&rank)));
    }

    #[test]
    fn export_reproduces_sorted_input(pairs in pairs_strategy(), layout in layout_strategy()) {
        let (_, matrix) = build(&pairs, layout);
        let exported: BTreeSet<(u32, u32)> = matrix.to_adjacency().unwrap().pairs().collect();
        prop_assert_eq!(exported, pairs);
    }
}

#[test]
fn layouts_agree_on_queries() {
    let pairs: BTreeSet<(u32, u32)> = [(40, 7), (40, 24), (51, 10), (63, 7)].into_iter().collect();
    let (_, row_major) = build(&pairs, Layout::RowMajor);
    let (_, col_major) = build(&pairs, Layout::ColumnMajor);

    for row in 0..ROWS {
        let a: Vec<u32> = row_major.decode_column_indices(row).unwrap().collect();
        let b: Vec<u32> = col_major.decode_column_indices(row).unwrap().collect();
        assert_eq!(a, b, "row {}", row);
    }
    assert_eq!(
        row_major.count_incoming_per_column().unwrap(),
        col_major.count_incoming_per_column().unwrap()
    );
}

#[test]
fn thirty_two_bit_flat_index_rejects_large_shape() {
    // 70 000 * 70 000 = 4.9e9 > u32::MAX
    assert!(70_000u64 * 70_000 > u32::MAX as u64);

    let err = OffsetMatrix::<u32, u32, u8>::new(0, 70_000, 0, 70_000, Layout::RowMajor).unwrap_err();
    match err {
        StorageError::IndexOverflow { value, width, .. } => {
            assert_eq!(value, 4_900_000_000);
            assert_eq!(width, "u32");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn independent_matrices_ingest_in_parallel() {
    let handles: Vec<_> = (0..4u32)
        .map(|shift| {
            std::thread::spawn(move || {
                let adjacency = Adjacency::from_pairs((0..16u32).map(|r| (r, (r + shift) % 16)));
                let mut matrix = ConnectivityMatrix::new(0, 16, 0, 16, Layout::RowMajor).unwrap();
                matrix
                    .init_from_adjacency(&adjacency, &MemoryBudget::Unlimited)
                    .unwrap();
                matrix.count_incoming_per_column().unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 16);
    }
}
