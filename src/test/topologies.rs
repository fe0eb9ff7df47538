use std::net::Ipv4Addr;

use crate::config::RedTest;
use crate::net::{NetWorld, NodeId};
use crate::queue::{PacketQueue, QueueMode, RedConfig, RedOverride};
use crate::sim::SimTime;
use crate::topo::{DumbbellOpts, build_dumbbell};

#[test]
fn dumbbell_has_six_named_nodes_and_expected_addresses() {
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world, &DumbbellOpts::default(), &RedConfig::default())
        .expect("build");

    assert_eq!(world.net.nodes().len(), 6);
    for i in 0..6 {
        assert_eq!(world.net.node_id(&format!("n{i}")).expect("name"), topo.node(i));
    }
    assert_eq!(world.net.links().len(), 10);

    assert_eq!(topo.addrs[0], [Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2)]);
    assert_eq!(topo.addrs[2], [Ipv4Addr::new(10, 1, 3, 1), Ipv4Addr::new(10, 1, 3, 2)]);
    assert_eq!(topo.addrs[3][1], Ipv4Addr::new(10, 1, 4, 2));
    assert_eq!(topo.addrs[4][1], Ipv4Addr::new(10, 1, 5, 2));
    assert_eq!(world.net.resolve(Ipv4Addr::new(10, 1, 4, 2)).expect("n4"), topo.node(4));
    assert_eq!(world.net.resolve(Ipv4Addr::new(10, 1, 2, 1)).expect("n1"), topo.node(1));
}

#[test]
fn dumbbell_links_have_expected_rates_delays_and_queues() {
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world, &DumbbellOpts::default(), &RedConfig::default())
        .expect("build");
    let net = &world.net;

    let backbone = net.link(topo.monitored_queue()).expect("n2->n3");
    assert_eq!(backbone.bandwidth_bps, 1_500_000);
    assert_eq!(backbone.latency, SimTime::from_millis(20));
    assert_eq!((backbone.from, backbone.to), (topo.node(2), topo.node(3)));
    assert!(net.red_queue(topo.monitored_queue()).is_ok());
    assert!(net.red_queue(topo.reverse_backbone_queue()).is_ok());
    assert_eq!(
        net.link_between(topo.node(2), topo.node(3)),
        Some(topo.monitored_queue())
    );
    assert_eq!(
        net.link_between(topo.node(3), topo.node(2)),
        Some(topo.reverse_backbone_queue())
    );
    assert_eq!(net.link_between(topo.node(0), topo.node(4)), None);

    let delays = [(topo.n0n2, 2), (topo.n1n2, 3), (topo.n3n4, 4), (topo.n3n5, 5)];
    for (link, ms) in delays {
        for dev in [link.fwd, link.rev] {
            let l = net.link(dev).expect("access link");
            assert_eq!(l.bandwidth_bps, 10_000_000);
            assert_eq!(l.latency, SimTime::from_millis(ms));
            assert!(l.queue.as_red().is_none());
            assert_eq!(l.queue.mode(), QueueMode::Packets);
        }
        assert!(net.red_queue(link.fwd).is_err());
    }
}

#[test]
fn dumbbell_routes_cross_the_backbone() {
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world, &DumbbellOpts::default(), &RedConfig::default())
        .expect("build");
    let n = |i| topo.node(i);
    let rt = world.net.routing();
    assert_eq!(rt.path(n(0), n(4)), Some(vec![n(0), n(2), n(3), n(4)]));
    assert_eq!(rt.path(n(1), n(5)), Some(vec![n(1), n(2), n(3), n(5)]));
    assert_eq!(rt.path(n(5), n(1)), Some(vec![n(5), n(3), n(2), n(1)]));
    assert_eq!(rt.path(n(0), n(1)), Some(vec![n(0), n(2), n(1)]));
    assert_eq!(n(0), NodeId(0));
}

#[test]
fn override_touches_only_the_reverse_backbone_queue() {
    let mut world = NetWorld::default();
    let red = RedConfig::for_test(RedTest::Bytes);
    let topo = build_dumbbell(&mut world, &DumbbellOpts::default(), &red).expect("build");

    world
        .net
        .override_red(topo.reverse_backbone_queue(), RedOverride::NS2_PACKET_MODE)
        .expect("override");

    let fwd = world.net.red_queue(topo.monitored_queue()).expect("fwd").config();
    assert_eq!(fwd.mode, QueueMode::Bytes);
    assert_eq!((fwd.min_th, fwd.max_th, fwd.queue_limit), (2500.0, 7500.0, 12_500));

    let rev = world
        .net
        .red_queue(topo.reverse_backbone_queue())
        .expect("rev")
        .config();
    assert_eq!(rev.mode, QueueMode::Packets);
    assert_eq!((rev.min_th, rev.max_th, rev.queue_limit), (5.0, 15.0, 25));

    // 非 RED 链路不能被覆盖
    assert!(world
        .net
        .override_red(topo.n0n2.fwd, RedOverride::NS2_PACKET_MODE)
        .is_err());
}

#[test]
fn dumbbell_rejects_invalid_red_and_duplicate_prefixes() {
    let mut world = NetWorld::default();
    let bad = RedConfig {
        min_th: 20.0,
        ..RedConfig::default()
    };
    assert!(build_dumbbell(&mut world, &DumbbellOpts::default(), &bad).is_err());

    let mut world = NetWorld::default();
    let mut opts = DumbbellOpts::default();
    opts.blocks[4] = opts.blocks[0];
    assert!(build_dumbbell(&mut world, &opts, &RedConfig::default()).is_err());
}
