//! Fuzz target for IRC message parsing
//!
//! Feeds arbitrary bytes through the same path the bouncer uses for socket
//! input: lossy UTF-8 decoding, parsing, then re-serialization.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bnc::message::DEFAULT_LINE_LIMIT;
use slirc_bnc::MessageRef;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }

    let line = String::from_utf8_lossy(data);
    if let Ok(msg) = MessageRef::parse(&line) {
        assert!(!msg.command.is_empty());
        assert!(msg.params.len() <= slirc_bnc::PARAM_MAX);

        // A parsed message must re-serialize into something that parses to
        // the same fields, unless it is too long.
        if let Ok(wire) = msg.serialize(DEFAULT_LINE_LIMIT) {
            let text = String::from_utf8(wire).expect("serializer emits UTF-8");
            let again = MessageRef::parse(&text).expect("serialized message parses");
            assert_eq!(again, msg);
        }
    }
});
