use launchtree_lib::model::{Node, NodeKind};
use launchtree_lib::order::fix_order;
use proptest::prelude::*;

fn siblings_from(positions: &[i64]) -> Vec<Node> {
    positions
        .iter()
        .enumerate()
        .map(|(index, &position)| Node {
            id: index as i64 + 1,
            parent_id: Some(-1),
            kind: NodeKind::Note,
            position,
            label: String::new(),
        })
        .collect()
}

proptest! {
    #[test]
    fn any_input_normalizes_to_dense_positions(
        positions in prop::collection::vec(-1_000i64..1_000, 0..32)
    ) {
        let mut siblings = siblings_from(&positions);
        fix_order(&mut siblings);

        for (index, node) in siblings.iter().enumerate() {
            prop_assert_eq!(node.position, index as i64);
        }

        // Resulting order is the (input position, id) sort: ties break by id,
        // so the result is deterministic for any permutation.
        let mut expected: Vec<(i64, i64)> = positions
            .iter()
            .enumerate()
            .map(|(index, &position)| (position, index as i64 + 1))
            .collect();
        expected.sort_unstable();
        let ids: Vec<i64> = siblings.iter().map(|n| n.id).collect();
        let expected_ids: Vec<i64> = expected.into_iter().map(|(_, id)| id).collect();
        prop_assert_eq!(ids, expected_ids);
    }

    #[test]
    fn normalization_is_idempotent(
        positions in prop::collection::vec(-1_000i64..1_000, 0..32)
    ) {
        let mut siblings = siblings_from(&positions);
        fix_order(&mut siblings);
        let first: Vec<(i64, i64)> = siblings.iter().map(|n| (n.id, n.position)).collect();
        fix_order(&mut siblings);
        let second: Vec<(i64, i64)> = siblings.iter().map(|n| (n.id, n.position)).collect();
        prop_assert_eq!(first, second);
    }
}
