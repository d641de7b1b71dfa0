//! Record lifetimes: cascades, races, references and owner hooks

use super::test_utils::Harness;
use dmsg_core::{LinkId, MediaId, Message, RefTag};
use dmsg_span::{ClusterKey, TopologyStats};
use dmsg_testkit::{conn, local_tx, named_uuid, span, tx, TopologyEvent};
use std::sync::Arc;

#[test]
fn test_closing_last_link_removes_node_and_cluster() {
    let h = Harness::new();
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    h.open_span(tx(2, 1), span("alpha", "n", 1));
    h.open_span(tx(3, 1), span("alpha", "m", 0));
    assert_eq!(
        h.service.stats(),
        TopologyStats {
            clusters: 1,
            nodes: 2,
            links: 3,
            connections: 0,
            relays: 0,
        }
    );

    h.close_span(tx(1, 1));
    assert_eq!(h.service.stats().nodes, 2);
    h.close_span(tx(2, 1));
    assert_eq!(h.service.stats().nodes, 1);
    assert_eq!(h.service.stats().clusters, 1);
    h.close_span(tx(3, 1));
    assert_eq!(h.service.stats(), TopologyStats::default());
}

#[test]
fn test_observer_sees_node_birth_and_death_once() {
    let h = Harness::new();
    let origin = span("alpha", "n", 2);
    h.open_span(tx(1, 1), origin.clone());
    h.open_span(tx(2, 1), span("alpha", "n", 0));
    let node = h.node_of(&origin);

    h.close_span(tx(1, 1));
    h.close_span(tx(2, 1));

    assert_eq!(
        h.observer.events(),
        vec![
            TopologyEvent::NodeAdded(node, origin.clone()),
            TopologyEvent::NodeRemoved(node, origin),
        ]
    );
}

#[test]
fn test_cluster_handle_pins_empty_cluster() {
    let h = Harness::new();
    let s = span("alpha", "n", 0);
    let key = ClusterKey::from_span(&s);
    let handle = h.service.acquire_cluster(key.clone());
    assert!(h.service.has_cluster(&key));

    h.open_span(tx(1, 1), s);
    h.close_span(tx(1, 1));
    assert!(h.service.has_cluster(&key));
    assert_eq!(h.service.stats().nodes, 0);

    assert!(h.service.release_cluster(handle));
    assert!(!h.service.has_cluster(&key));
}

#[test]
fn test_cluster_release_keeps_populated_cluster() {
    let h = Harness::new();
    let s = span("alpha", "n", 0);
    let handle = h.service.acquire_cluster(ClusterKey::from_span(&s));
    h.open_span(tx(1, 1), s);

    assert!(!h.service.release_cluster(handle));
    assert_eq!(h.service.stats().clusters, 1);
}

#[test]
fn test_remote_close_after_link_teardown_is_absorbed() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    let target = h.service.relays_on(c)[0].target;

    h.close_span(tx(1, 1));
    assert!(h.service.relay(target).is_none());

    h.service
        .handle_relay_reply(&Message::relay_close(target))
        .unwrap();
    let closes = h.transport.replies().iter().filter(|t| **t == target).count();
    assert_eq!(closes, 2);
    assert!(h.transport.never_over_released());
    assert_eq!(h.transport.refs(target, RefTag::RelayTarget), 0);
}

#[test]
fn test_remote_close_before_link_teardown() {
    let h = Harness::new();
    let c = tx(10, 1);
    let source = tx(1, 1);
    h.open_conn(c, conn("media"));
    h.open_span(source, span("alpha", "n", 0));
    let target = h.service.relays_on(c)[0].target;

    h.service.dispatch(&Message::relay_close(target)).unwrap();
    assert!(h.service.relays_on(c).is_empty());
    assert_eq!(h.transport.refs(source, RefTag::RelaySource), 0);
    assert_eq!(h.transport.refs(source, RefTag::Link), 1);
    assert!(h
        .service
        .find_link_by_transaction(source)
        .unwrap()
        .relays
        .is_empty());

    h.close_span(source);
    h.close_conn(c);
    assert!(h.transport.outstanding_refs().is_empty());
    assert!(h.transport.never_over_released());
}

#[test]
fn test_relay_reply_without_close_changes_nothing() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    let target = h.service.relays_on(c)[0].target;

    let mut ack = Message::relay_close(target);
    ack.flags.delete = false;
    h.service.dispatch(&ack).unwrap();
    assert_eq!(h.service.relays_on(c).len(), 1);
    assert!(!h.transport.replies().contains(&target));
}

#[test]
fn test_connection_close_tears_down_its_relays_only() {
    let h = Harness::new();
    let c1 = tx(10, 1);
    let c2 = tx(11, 1);
    h.open_conn(c1, conn("media"));
    h.open_conn(c2, conn("media"));
    h.open_span(tx(1, 1), span("alpha", "n", 0));
    h.open_span(tx(2, 1), span("alpha", "n", 1));
    let doomed: Vec<_> = h.service.relays_on(c1).iter().map(|r| r.target).collect();

    h.close_conn(c1);

    assert!(h.service.relays_on(c1).is_empty());
    assert_eq!(h.service.relays_on(c2).len(), 2);
    for target in doomed {
        assert!(h.transport.replies().contains(&target));
        assert_eq!(h.transport.refs(target, RefTag::RelayTarget), 0);
    }
    assert_eq!(h.transport.refs(c1, RefTag::Conn), 0);
    assert!(h.transport.replies().contains(&c1));
    let links = h.service.find_link_by_transaction(tx(1, 1)).unwrap();
    assert_eq!(links.relays.len(), 1);
}

#[test]
fn test_media_released_with_last_connection() {
    let h = Harness::new();
    h.open_conn(tx(10, 1), conn("shared"));
    h.open_conn(tx(11, 1), conn("shared"));
    h.open_conn(tx(12, 1), conn("solo"));

    h.close_conn(tx(10, 1));
    assert!(h.observer.topology_events().is_empty());
    h.close_conn(tx(11, 1));
    h.close_conn(tx(12, 1));

    assert_eq!(
        h.observer.topology_events(),
        vec![
            TopologyEvent::MediaReleased(MediaId::from_uuid(named_uuid("shared"))),
            TopologyEvent::MediaReleased(MediaId::from_uuid(named_uuid("solo"))),
        ]
    );
}

#[test]
fn test_owner_told_of_each_connection_open() {
    let h = Harness::new();
    h.open_conn(tx(10, 1), conn("shared"));
    h.open_conn(tx(11, 1), conn("solo"));
    assert!(h.service.handle_conn_open(tx(10, 1), conn("shared")).is_err());

    assert_eq!(
        h.observer.events(),
        vec![
            TopologyEvent::ConnOpened(tx(10, 1), MediaId::from_uuid(named_uuid("shared"))),
            TopologyEvent::ConnOpened(tx(11, 1), MediaId::from_uuid(named_uuid("solo"))),
        ]
    );
}

#[test]
fn test_relay_and_inbound_span_sharing_msgid_stay_apart() {
    let h = Harness::new();
    let c10 = tx(10, 100);
    let c20 = tx(20, 100);
    h.open_conn(c10, conn("media"));
    h.open_conn(c20, conn("media"));

    // Relayed out link 10 as the first transaction we open there.
    h.open_span(tx(20, 1), span("alpha", "n", 0));
    let relay = h.service.relays_on(c10)[0].target;
    assert_eq!(relay, local_tx(10, 1));

    // The peer on link 10 opens its own msgid 1.
    let inbound = tx(10, 1);
    h.open_span(inbound, span("alpha", "m", 0));
    assert_ne!(relay, inbound);
    assert_eq!(h.service.relay(relay).unwrap().source, tx(20, 1));
    assert_eq!(h.service.find_link_by_transaction(inbound).unwrap().tx, inbound);
    assert!(h.service.find_link_by_transaction(relay).is_none());
    assert_eq!(h.transport.refs(inbound, RefTag::Link), 1);
    assert_eq!(h.transport.refs(relay, RefTag::RelayTarget), 1);

    // Closing the inbound span leaves the relay alone.
    h.close_span(inbound);
    assert_eq!(h.relayed_sources(c10), vec![tx(20, 1)]);
    assert_eq!(h.transport.open_outgoing_on(LinkId(10)), vec![relay]);
    assert_eq!(h.transport.refs(relay, RefTag::RelayTarget), 1);

    // And the remote closing the relay leaves the inbound id unknown.
    h.service.dispatch(&Message::relay_close(relay)).unwrap();
    assert!(h.service.relays_on(c10).is_empty());
    assert!(h.service.handle_span_close(inbound).is_err());
    assert_eq!(h.service.stats().links, 1);
}

#[test]
fn test_references_balance_after_full_teardown() {
    let h = Harness::new();
    let conns = [tx(10, 1), tx(11, 1), tx(12, 1)];
    for c in conns {
        h.open_conn(c, conn("media"));
    }
    for link in 1..=4 {
        h.open_span(tx(link, 1), span("alpha", "a", link as u32));
        h.open_span(tx(link, 2), span("beta", "b", 0));
    }
    assert!(!h.transport.outstanding_refs().is_empty());

    h.close_conn(conns[1]);
    for link in 1..=4 {
        h.close_span(tx(link, 1));
        h.close_span(tx(link, 2));
    }
    h.close_conn(conns[0]);
    h.close_conn(conns[2]);

    assert!(h.transport.outstanding_refs().is_empty());
    assert!(h.transport.never_over_released());
    assert!(h.transport.open_outgoing().is_empty());
    assert_eq!(h.service.stats(), TopologyStats::default());
}

#[test]
fn test_node_opaque_slot() {
    let h = Harness::new();
    let s = span("alpha", "n", 0);
    h.open_span(tx(1, 1), s.clone());
    let node = h.node_of(&s);

    assert!(h.service.node_opaque(node).is_none());
    h.service
        .set_node_opaque(node, Some(Arc::new(41u32)))
        .unwrap();
    let stored = h.service.node_opaque(node).unwrap();
    assert_eq!(stored.downcast_ref::<u32>(), Some(&41));

    h.close_span(tx(1, 1));
    assert!(h.service.set_node_opaque(node, None).is_err());
}

#[test]
fn test_link_lookups() {
    let h = Harness::new();
    let c = tx(10, 1);
    h.open_conn(c, conn("media"));
    h.open_span(tx(1, 7), span("alpha", "n", 1));
    h.open_span(tx(2, 9), span("beta", "m", 0));

    let info = h.service.find_link_by_transaction(tx(1, 7)).unwrap();
    assert_eq!(info.cluster.peer_label.as_str(), "alpha");
    assert_eq!(info.node_key.pfs_label.as_str(), "n");
    assert_eq!(info.span.dist, 1);
    assert_eq!(info.relays, vec![h.service.relays_on(c)[0].target]);
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["span"]["dist"], 1);
    assert_eq!(json["cluster"]["peer_label"], "alpha");

    let by_msgid = h.service.find_link_by_msgid(9).unwrap();
    assert_eq!(by_msgid.tx, tx(2, 9));
    assert!(h.service.find_link_by_msgid(8).is_none());
    assert!(h.service.find_link_by_transaction(tx(3, 7)).is_none());
}
