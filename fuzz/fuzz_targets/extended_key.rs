#![no_main]

use bitcoin::Network;
use libfuzzer_sys::fuzz_target;
use satwatch_monitor::{models::Branch, services::derivation::ExtendedPubKey};

fuzz_target!(|data: &[u8]| {
    let key = String::from_utf8_lossy(data);
    if let Ok(key) = ExtendedPubKey::parse(&key, Network::Bitcoin) {
        let _ = key.derive_address(Branch::External, 0);
    }
});
