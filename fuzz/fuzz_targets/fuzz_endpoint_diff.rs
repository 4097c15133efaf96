//! Fuzz target for the remote endpoint diff.
//!
//! Arbitrary local/remote/listed sets must never produce an add or delete
//! for a local endpoint, and the remote view must end up free of them.

#![no_main]

use libfuzzer_sys::fuzz_target;
use network_store::diff_remote_endpoints;
use network_store::model::{Endpoint, Network};
use std::collections::HashMap;

fn build(network: &Network, entries: &[(u8, u8)]) -> Vec<Endpoint> {
    entries
        .iter()
        .map(|(id, name)| Endpoint::new(format!("e{}", id % 16), format!("n{}", name % 4), network))
        .collect()
}

fuzz_target!(|data: (Vec<(u8, u8)>, Vec<(u8, u8)>, Vec<(u8, u8)>)| {
    let (local, remote, listed) = data;
    let network = Network::new("n1", "front", "overlay", "global");

    let local: HashMap<String, Endpoint> = build(&network, &local)
        .into_iter()
        .map(|e| (e.id().to_string(), e))
        .collect();
    let mut remote: HashMap<String, Endpoint> = build(&network, &remote)
        .into_iter()
        .map(|e| (e.id().to_string(), e))
        .collect();

    let diff = diff_remote_endpoints(&local, &mut remote, build(&network, &listed));

    for ep in diff.adds.iter().chain(diff.deletes.iter()) {
        assert!(!local.contains_key(ep.id()));
    }
    for id in remote.keys() {
        assert!(!local.contains_key(id));
    }
});
