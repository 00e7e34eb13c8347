use iroh_snr::{derive_node_id, routing_target, xor_distance, PeerId, PeerRanker, XorRanker};

fn make_peer_id(byte: u8) -> PeerId {
    let mut id = [0u8; 32];
    id[0] = byte;
    id
}

#[test]
fn ranker_orders_peers_by_keyspace_distance() {
    let peers: Vec<PeerId> = [0x10, 0x20, 0x08, 0x80, 0xC0].map(make_peer_id).to_vec();
    let key = b"/ipns/example";
    let target = routing_target(key);

    let mut expected = peers.clone();
    expected.sort_by_key(|peer| xor_distance(&derive_node_id(peer), &target));

    assert_eq!(XorRanker.rank(&peers, key), expected);
}

#[test]
fn ranking_ignores_input_order() {
    let peers: Vec<PeerId> = (1..=6).map(make_peer_id).collect();
    let mut reversed = peers.clone();
    reversed.reverse();

    assert_eq!(
        XorRanker.rank(&peers, b"key"),
        XorRanker.rank(&reversed, b"key")
    );
}

#[test]
fn different_keys_spread_first_choice() {
    let peers: Vec<PeerId> = (1..=8).map(make_peer_id).collect();
    let firsts: std::collections::HashSet<PeerId> = (0..64)
        .map(|i| XorRanker.rank(&peers, format!("/pk/{i}").as_bytes())[0])
        .collect();

    assert!(firsts.len() > 1, "every key ranked the same relay first");
}
