#![no_main]

use bitcoin::Network;
use libfuzzer_sys::fuzz_target;
use satwatch_monitor::services::monitor::{decode_transaction, match_transaction};

fuzz_target!(|data: &[u8]| {
    if let Ok(tx) = decode_transaction(data) {
        let _ = match_transaction(&tx, &[], Network::Bitcoin);
    }
});
