//! Fuzz target for decoding stored values.
//!
//! Whatever another node wrote under a key, decoding it must fail cleanly
//! rather than panic, and a successful decode must re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use network_store::model::{Endpoint, EndpointCount, Network, NetworkRef};
use network_store::KvObject;

fuzz_target!(|data: &[u8]| {
    let mut network = Network::default();
    if network.set_value(data).is_ok() {
        assert!(network.value().is_ok());
    }

    let mut endpoint = Endpoint::prototype(NetworkRef::default());
    if endpoint.set_value(data).is_ok() {
        assert!(endpoint.value().is_ok());
    }

    let mut ec = EndpointCount::new(NetworkRef::default());
    if ec.set_value(data).is_ok() {
        assert!(ec.value().is_ok());
    }
});
