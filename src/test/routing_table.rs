use crate::net::{NodeId, RoutingTable};

fn build_rev_adj(adj: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    let mut rev = vec![Vec::new(); adj.len()];
    for (from, nbrs) in adj.iter().enumerate() {
        for &to in nbrs {
            rev[to.0].push(NodeId(from));
        }
    }
    rev
}

#[test]
fn routing_table_builds_next_hops_for_shortest_paths() {
    // Diamond:
    // 0 -> 1 -> 3
    //  \-> 2 ->/
    let adj = vec![
        vec![NodeId(1), NodeId(2)],
        vec![NodeId(3)],
        vec![NodeId(3)],
        vec![],
    ];
    let rev_adj = build_rev_adj(&adj);

    let mut rt = RoutingTable::default();
    assert!(!rt.is_built());
    rt.build(&adj, &rev_adj);
    assert!(rt.is_built());

    // 等价下一跳取链路创建顺序靠前的
    assert_eq!(rt.next_hop(NodeId(0), NodeId(3)), Some(NodeId(1)));
    assert_eq!(rt.next_hop(NodeId(0), NodeId(1)), Some(NodeId(1)));
    assert_eq!(rt.next_hop(NodeId(0), NodeId(2)), Some(NodeId(2)));
    assert_eq!(rt.next_hop(NodeId(2), NodeId(3)), Some(NodeId(3)));

    assert!(rt.next_hop(NodeId(3), NodeId(0)).is_none());
    assert!(rt.next_hop(NodeId(0), NodeId(0)).is_none());
}

#[test]
fn routing_table_expands_paths() {
    // 0 <-> 1 <-> 2
    let adj = vec![
        vec![NodeId(1)],
        vec![NodeId(0), NodeId(2)],
        vec![NodeId(1)],
    ];
    let rev_adj = build_rev_adj(&adj);
    let mut rt = RoutingTable::default();
    rt.build(&adj, &rev_adj);

    assert_eq!(
        rt.path(NodeId(0), NodeId(2)),
        Some(vec![NodeId(0), NodeId(1), NodeId(2)])
    );
    assert_eq!(
        rt.path(NodeId(2), NodeId(0)),
        Some(vec![NodeId(2), NodeId(1), NodeId(0)])
    );
    assert_eq!(rt.path(NodeId(1), NodeId(1)), Some(vec![NodeId(1)]));
}

#[test]
fn routing_table_reports_unreachable() {
    let adj = vec![vec![NodeId(1)], vec![], vec![]];
    let rev_adj = build_rev_adj(&adj);
    let mut rt = RoutingTable::default();
    rt.build(&adj, &rev_adj);
    assert!(rt.path(NodeId(0), NodeId(2)).is_none());
    assert!(rt.path(NodeId(1), NodeId(0)).is_none());
}
