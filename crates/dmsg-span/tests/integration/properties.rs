//! Property tests for relay selection

use super::test_utils::Harness;
use dmsg_core::{NodeId, TransactionId};
use dmsg_span::SpanConfig;
use dmsg_testkit::{conn, tx, SpanBuilder};
use proptest::prelude::*;

/// (physical link, dist, rnss) of one received span for node "n"
fn arb_links() -> impl Strategy<Value = Vec<(u64, u32, u32)>> {
    prop::collection::vec((1u64..6, 0u32..20, 0u32..3), 1..10)
}

fn open_all(h: &Harness, links: &[(u64, u32, u32)]) -> Vec<TransactionId> {
    links
        .iter()
        .enumerate()
        .map(|(i, (link, dist, rnss))| {
            let t = tx(*link, i as u64 + 1);
            h.open_span(
                t,
                SpanBuilder::new("alpha", "n").dist(*dist).rnss(*rnss).build(),
            );
            t
        })
        .collect()
}

proptest! {
    /// Arrival order never changes the converged relay set
    #[test]
    fn selection_is_order_independent(links in arb_links(), conn_link in 1u64..7) {
        let c = tx(conn_link, 1000);
        let forward = Harness::new();
        forward.open_conn(c, conn("media"));
        open_all(&forward, &links);

        let backward = Harness::new();
        backward.open_conn(c, conn("media"));
        let indexed: Vec<_> = links.iter().enumerate().collect();
        for (i, (link, dist, rnss)) in indexed.into_iter().rev() {
            backward.open_span(
                tx(*link, i as u64 + 1),
                SpanBuilder::new("alpha", "n").dist(*dist).rnss(*rnss).build(),
            );
        }

        prop_assert_eq!(forward.relayed_sources(c), backward.relayed_sources(c));
    }

    /// A second rescan with nothing changed does nothing
    #[test]
    fn rescan_converges_in_one_pass(links in arb_links(), symmetric in any::<bool>()) {
        let config = if symmetric { SpanConfig::symmetric() } else { SpanConfig::default() };
        let h = Harness::with_config(config);
        h.open_conn(tx(9, 1), conn("media"));
        h.open_conn(tx(3, 1000), conn("media"));
        open_all(&h, &links);

        prop_assert!(h.service.maintain().is_empty());
    }

    /// Every relay respects fan-out, hop ceiling, loopback and dist + 1
    #[test]
    fn relays_obey_selection_bounds(links in arb_links(), conn_link in 1u64..7) {
        let config = SpanConfig::testing();
        let h = Harness::with_config(config.clone());
        let c = tx(conn_link, 1000);
        h.open_conn(c, conn("media"));
        open_all(&h, &links);

        let relays = h.service.relays_on(c);
        prop_assert!(relays.len() <= config.fanout);
        for relay in &relays {
            prop_assert!(relay.source_dist <= config.max_dist);
            prop_assert_ne!(relay.source.link, c.link);
            let sent = h.transport.announcement(relay.target).unwrap();
            prop_assert_eq!(sent.dist, relay.source_dist + 1);
        }

        // The chosen relays are a prefix of the node's links, best first.
        let ranked = h.service.links_of(node_n(&h));
        let chosen: Vec<_> = relays.iter().map(|r| r.source).collect();
        prop_assert_eq!(&ranked[..chosen.len()], &chosen[..]);
    }

    /// Tearing everything down hands back every reference
    #[test]
    fn teardown_balances_references(links in arb_links(), close_conn_first in any::<bool>()) {
        let h = Harness::new();
        let c = tx(9, 1);
        h.open_conn(c, conn("media"));
        let opened = open_all(&h, &links);

        if close_conn_first {
            h.close_conn(c);
        }
        for t in opened {
            h.close_span(t);
        }
        if !close_conn_first {
            h.close_conn(c);
        }

        prop_assert!(h.transport.outstanding_refs().is_empty());
        prop_assert!(h.transport.never_over_released());
        prop_assert!(h.transport.open_outgoing().is_empty());
    }
}

fn node_n(h: &Harness) -> NodeId {
    h.node_of(&SpanBuilder::new("alpha", "n").build())
}
