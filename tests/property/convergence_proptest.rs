//! Replicas converge regardless of delivery order or duplication

use proptest::prelude::*;
use xfcanvas::shared::{Arrow, ConversationPoint, Delta, Origin, Position, ReplicaDocument, WorkspaceSnapshot};

const SCREENS: [&str; 3] = ["s1", "s2", "s3"];

#[derive(Debug, Clone)]
enum Edit {
    Move(usize, i32, i32),
    Height(usize, u16),
    Select(usize, i64),
    PutPoint(usize, i64, String),
    Retitle(usize, i64, String),
    Arrows(usize, i64, Vec<usize>),
    RemovePoint(usize, i64),
    RemoveScreen(usize),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    let screen = 0..SCREENS.len();
    let ts = 1i64..6;
    prop_oneof![
        (screen.clone(), -500i32..500, -500i32..500).prop_map(|(s, x, y)| Edit::Move(s, x, y)),
        (screen.clone(), 1u16..2000).prop_map(|(s, h)| Edit::Height(s, h)),
        (screen.clone(), 0i64..4).prop_map(|(s, i)| Edit::Select(s, i)),
        (screen.clone(), ts.clone(), "[a-z]{1,8}").prop_map(|(s, t, p)| Edit::PutPoint(s, t, p)),
        (screen.clone(), ts.clone(), "[A-Z]{1,6}").prop_map(|(s, t, p)| Edit::Retitle(s, t, p)),
        (screen.clone(), ts.clone(), prop::collection::vec(0..SCREENS.len(), 0..3))
            .prop_map(|(s, t, targets)| Edit::Arrows(s, t, targets)),
        (screen.clone(), ts).prop_map(|(s, t)| Edit::RemovePoint(s, t)),
        screen.prop_map(Edit::RemoveScreen),
    ]
}

fn apply_edit(replica: &ReplicaDocument, edit: &Edit) {
    replica.mutate(|ws| match edit {
        Edit::Move(s, x, y) => ws.set_position(SCREENS[*s], Position::new(*x as f64, *y as f64)),
        Edit::Height(s, h) => ws.set_height(SCREENS[*s], *h as f64),
        Edit::Select(s, i) => ws.set_selected_index(SCREENS[*s], *i),
        Edit::PutPoint(s, t, prompt) => {
            ws.put_conversation_point(SCREENS[*s], &ConversationPoint::new(*t, prompt.clone()))
        }
        Edit::Retitle(s, t, title) => ws.set_point_title(SCREENS[*s], *t, title),
        Edit::Arrows(s, t, targets) => {
            let arrows: Vec<Arrow> = targets
                .iter()
                .enumerate()
                .map(|(i, target)| Arrow {
                    touchable_id: format!("btn-{}", i),
                    target_screen_id: SCREENS[*target].to_string(),
                    start_point: Position::new(i as f64, 0.0),
                })
                .collect();
            ws.set_arrows(SCREENS[*s], *t, &arrows)
        }
        Edit::RemovePoint(s, t) => ws.remove_conversation_point(SCREENS[*s], *t),
        Edit::RemoveScreen(s) => ws.remove_screen(SCREENS[*s]),
    });
}

/// Full state of each replica after its own edits
fn replica_states(edits: &[Vec<Edit>]) -> Vec<Delta> {
    edits
        .iter()
        .map(|list| {
            let replica = ReplicaDocument::new();
            for edit in list {
                apply_edit(&replica, edit);
            }
            replica.encode_full_state()
        })
        .collect()
}

/// Deliver `states` in `order`, then once more in index order so nothing is skipped
fn deliver(states: &[Delta], order: &[usize]) -> WorkspaceSnapshot {
    let replica = ReplicaDocument::new();
    for index in order.iter().map(|i| i % states.len()).chain(0..states.len()) {
        replica.apply_delta(&states[index], Origin::Remote).unwrap();
    }
    replica.snapshot()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_delivery_order_does_not_matter(
        edits in prop::collection::vec(prop::collection::vec(edit_strategy(), 0..12), 2..4),
        first in prop::collection::vec(0usize..8, 0..10),
        second in prop::collection::vec(0usize..8, 0..10),
    ) {
        let states = replica_states(&edits);
        let mut reversed: Vec<usize> = (0..states.len()).rev().collect();
        reversed.extend(second);

        prop_assert_eq!(deliver(&states, &first), deliver(&states, &reversed));
    }

    #[test]
    fn prop_reapplying_is_a_noop(edits in prop::collection::vec(edit_strategy(), 0..20)) {
        let states = replica_states(&[edits]);
        let replica = ReplicaDocument::from_state(&states[0], Origin::Remote).unwrap();
        let before = replica.snapshot();
        let vector = replica.state_vector();

        replica.apply_delta(&states[0], Origin::Remote).unwrap();
        prop_assert_eq!(replica.snapshot(), before);
        prop_assert_eq!(replica.state_vector(), vector);
    }

    #[test]
    fn prop_missing_delta_brings_peer_up_to_date(
        shared in prop::collection::vec(edit_strategy(), 0..8),
        extra in prop::collection::vec(edit_strategy(), 1..8),
    ) {
        let server = ReplicaDocument::new();
        for edit in &shared {
            apply_edit(&server, edit);
        }
        let client = ReplicaDocument::from_state(&server.encode_full_state(), Origin::RemoteSync).unwrap();
        for edit in &extra {
            apply_edit(&server, edit);
        }

        let missing = server.missing_for(&client.state_vector()).unwrap();
        client.apply_delta(&missing, Origin::RemoteSync).unwrap();
        prop_assert_eq!(client.snapshot(), server.snapshot());
    }
}
