#![no_main]

use libfuzzer_sys::fuzz_target;
use plover_core::objects::tagged::ObjectRef;

fuzz_target!(|data: &[u8]| {
    // Eight bytes at a time: interpret as an i64 and check the immediate
    // encoding round-trips over the representable range.
    let mut chunk = data;
    while chunk.len() >= 8 {
        let raw = i64::from_le_bytes(chunk[..8].try_into().unwrap());
        chunk = &chunk[8..];

        // Clamp into the 63-bit immediate range.
        let value = (raw << 1) >> 1;
        let r = ObjectRef::small(value);
        assert!(r.is_small_integer());
        assert!(!r.is_heap_object());
        assert!(!r.is_new_object());
        assert!(r.is_immediate_or_old());
        assert_eq!(r.small_value(), value, "immediate round trip");

        // Every immediate's raw word has the tag bit clear.
        assert_eq!(r.raw() & 1, 0);
    }
});
