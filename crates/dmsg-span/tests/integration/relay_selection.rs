//! Which links get relayed where

use super::test_utils::Harness;
use dmsg_core::{LinkId, Message, PfsType};
use dmsg_span::SpanConfig;
use dmsg_testkit::{client_conn, conn, named_uuid, span, tx, SequenceRandom, SpanBuilder};
use std::sync::Arc;

#[test]
fn test_best_two_links_relayed_and_replaced_on_close() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));

    let l1 = tx(1, 1);
    let l2 = tx(2, 1);
    let l3 = tx(3, 1);
    h.open_span(l1, span("alpha", "node-n", 1));
    h.open_span(l2, span("alpha", "node-n", 1));
    h.open_span(l3, span("alpha", "node-n", 2));

    assert_eq!(h.relayed_sources(c), vec![l1, l2]);
    assert_eq!(h.transport.opened_count(), 2);
    assert!(h.service.maintain().is_empty());

    let l1_relay = h.service.relays_on(c)[0].target;
    h.close_span(l1);

    assert_eq!(h.relayed_sources(c), vec![l2, l3]);
    assert!(h.transport.replies().contains(&l1_relay));
    assert_eq!(h.service.stats().relays, 2);
}

#[test]
fn test_selection_independent_of_arrival_order() {
    let forward = Harness::new();
    let reverse = Harness::new();
    let c = tx(10, 1);
    let links = [
        (tx(3, 1), span("alpha", "node-n", 2)),
        (tx(1, 1), span("alpha", "node-n", 1)),
        (tx(2, 1), span("alpha", "node-n", 1)),
    ];

    forward.open_conn(c, conn("media"));
    for (t, s) in &links {
        forward.open_span(*t, s.clone());
    }

    for (t, s) in links.iter().rev() {
        reverse.open_span(*t, s.clone());
    }
    reverse.open_conn(c, conn("media"));

    assert_eq!(forward.relayed_sources(c), reverse.relayed_sources(c));
    assert_eq!(forward.relayed_sources(c), vec![tx(1, 1), tx(2, 1)]);
}

#[test]
fn test_rnss_breaks_dist_ties_before_transaction() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 1), SpanBuilder::new("alpha", "n").dist(1).rnss(9).build());
    h.open_span(tx(2, 1), SpanBuilder::new("alpha", "n").dist(1).rnss(3).build());
    h.open_span(tx(3, 1), SpanBuilder::new("alpha", "n").dist(1).rnss(3).build());

    assert_eq!(h.relayed_sources(c), vec![tx(2, 1), tx(3, 1)]);
}

#[test]
fn test_relay_announces_one_more_hop_and_binds_circuit() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    let source = tx(1, 1);
    h.open_span(source, SpanBuilder::new("alpha", "n").dist(3).rnss(5).build());

    let relay = h.service.relays_on(c)[0];
    assert_eq!(relay.target.link, LinkId(10));
    let sent = h.transport.announcement(relay.target).unwrap();
    assert_eq!(sent.dist, 4);
    assert_eq!(sent.rnss, 5);
    assert_eq!(sent.pfs_label.as_str(), "n");
    assert_eq!(h.transport.circuit(relay.target), Some(source));
}

#[test]
fn test_each_relay_draws_fresh_sub_sort() {
    let random = Arc::new(SequenceRandom::new(vec![7, 11]));
    let h = Harness::with_random(SpanConfig::default(), random);
    let conns = [tx(10, 1), tx(11, 1)];
    for c in conns {
        h.open_conn(c, conn("media"));
    }
    h.open_span(tx(1, 1), SpanBuilder::new("alpha", "n").dist(2).rnss(5).build());

    let mut drawn = Vec::new();
    for c in conns {
        let relays = h.service.relays_on(c);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].source_rnss, 5);
        let sent = h.transport.announcement(relays[0].target).unwrap();
        assert_eq!(sent.dist, 3);
        drawn.push(sent.rnss - relays[0].source_rnss);
    }
    drawn.sort();
    assert_eq!(drawn, vec![7, 11]);
}

#[test]
fn test_links_past_max_dist_never_relayed() {
    let h = Harness::with_config(SpanConfig::testing());
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "far", 5));
    h.open_span(tx(2, 1), span("alpha", "edge", 4));

    let sources = h.relayed_sources(c);
    assert_eq!(sources, vec![tx(2, 1)]);
    let relay = h.service.relays_on(c)[0];
    assert_eq!(h.transport.announcement(relay.target).unwrap().dist, 5);
}

#[test]
fn test_span_not_reflected_to_its_own_link() {
    let h = Harness::new();
    let back = tx(1, 100);
    let other = tx(2, 100);
    h.open_conn(back, conn("media"));
    h.open_conn(other, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "n", 0));

    assert!(h.relayed_sources(back).is_empty());
    assert_eq!(h.relayed_sources(other), vec![tx(1, 1)]);
    assert!(h.transport.open_outgoing_on(LinkId(1)).is_empty());
}

#[test]
fn test_best_route_through_connection_suppresses_worse_routes() {
    let h = Harness::new();
    let c = tx(1, 100);
    h.open_conn(c, conn("media"));
    h.open_span(tx(2, 1), span("alpha", "n", 2));
    assert_eq!(h.relayed_sources(c), vec![tx(2, 1)]);

    // A better route arrives over the connection's own link.
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    assert!(h.relayed_sources(c).is_empty());
}

#[test]
fn test_clients_never_see_clients() {
    let h = Harness::new();
    let client = tx(10, 1);
    h.open_conn(client, client_conn("media"));
    let client_span = SpanBuilder::new("alpha", "laptop")
        .pfs_type(PfsType::Client)
        .build();
    h.open_span(tx(1, 1), client_span);
    h.open_span(tx(2, 1), span("alpha", "server", 0));

    assert_eq!(h.relayed_sources(client), vec![tx(2, 1)]);
}

#[test]
fn test_masks_and_cluster_filters() {
    let h = Harness::new();
    let by_id = tx(10, 1);
    let by_label = tx(11, 1);
    let masters_only = tx(12, 1);
    h.open_conn(by_id, conn("media").with_peer_id(named_uuid("beta")));
    h.open_conn(by_label, conn("media").with_peer_label("alpha"));
    h.open_conn(
        masters_only,
        conn("media").with_pfs_mask(PfsType::Master.mask_bit()),
    );

    h.open_span(tx(1, 1), span("alpha", "a", 0));
    h.open_span(tx(2, 1), span("beta", "b", 0));
    h.open_span(
        tx(3, 1),
        SpanBuilder::new("gamma", "c").pfs_type(PfsType::Slave).build(),
    );

    assert_eq!(h.relayed_sources(by_id), vec![tx(2, 1)]);
    assert_eq!(h.relayed_sources(by_label), vec![tx(1, 1)]);
    let mut masters = h.relayed_sources(masters_only);
    masters.sort();
    assert_eq!(masters, vec![tx(1, 1), tx(2, 1)]);
}

#[test]
fn test_fanout_applies_per_node_and_per_connection() {
    let h = Harness::new();
    let c1 = tx(10, 1);
    let c2 = tx(11, 1);
    h.open_conn(c1, conn("media"));
    h.open_conn(c2, conn("media"));
    for link in 1..=3 {
        h.open_span(tx(link, 1), span("alpha", "a", 1));
        h.open_span(tx(link, 2), span("alpha", "b", 1));
    }

    let a = h.node_of(&span("alpha", "a", 0));
    let b = h.node_of(&span("alpha", "b", 0));
    for c in [c1, c2] {
        assert_eq!(h.relays_for(c, a).len(), 2);
        assert_eq!(h.relays_for(c, b).len(), 2);
    }
    assert_eq!(h.service.stats().relays, 8);
}

#[test]
fn test_symmetric_mode_keeps_ties_past_fanout() {
    let plain = Harness::new();
    let symmetric = Harness::with_config(SpanConfig::symmetric());
    let c = tx(10, 1);
    for h in [&plain, &symmetric] {
        h.open_conn(c, conn("media"));
        h.open_span(tx(1, 1), span("alpha", "n", 1));
        h.open_span(tx(2, 1), span("alpha", "n", 1));
        h.open_span(tx(3, 1), span("alpha", "n", 1));
        h.open_span(tx(4, 1), span("alpha", "n", 2));
    }

    assert_eq!(plain.relayed_sources(c), vec![tx(1, 1), tx(2, 1)]);
    assert_eq!(
        symmetric.relayed_sources(c),
        vec![tx(1, 1), tx(2, 1), tx(3, 1)]
    );
    assert!(symmetric.service.maintain().is_empty());
}

#[test]
fn test_rescan_is_idempotent() {
    let h = Harness::new();
    h.open_conn(tx(10, 1), conn("media"));
    h.open_conn(tx(11, 1), conn("other"));
    h.open_span(tx(1, 1), span("alpha", "a", 0));
    h.open_span(tx(2, 1), span("alpha", "a", 3));
    h.open_span(tx(3, 1), span("beta", "b", 1));

    let before = h.transport.events().len();
    assert!(h.service.maintain().is_empty());
    assert!(h.service.rescan(Some(tx(10, 1)), None).is_empty());
    assert_eq!(h.transport.events().len(), before);
}

#[test]
fn test_targeted_rescan_restores_remotely_closed_relay() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    let node = h.node_of(&span("alpha", "n", 0));

    let first = h.service.relays_on(c)[0].target;
    h.service
        .handle_relay_reply(&Message::relay_close(first))
        .unwrap();
    assert!(h.service.relays_on(c).is_empty());

    let report = h.service.rescan(Some(c), Some(node));
    assert_eq!(report.created, 1);
    let second = h.service.relays_on(c)[0].target;
    assert_ne!(first, second);
}
