#![no_main]

use libfuzzer_sys::{Corpus, fuzz_target};
use tessera_engine::{LAST_UNBOUNDED, Outcome, SpanOptions};
use tessera_fuzz::{FuzzPackAction, gather_spans, pack_in_chunks};

fuzz_target!(|action: FuzzPackAction| -> Corpus {
    if action.budgets.iter().all(|&b| b == 0) {
        return Corpus::Reject;
    }
    let Ok(mut whole) = action.segment() else {
        return Corpus::Reject;
    };
    let len = action.buffer_len();
    let buffer = (0u8..=250).cycle().take(len).collect::<Vec<_>>();

    let expected = tessera_engine::pack(&buffer, 0, action.count, &action.dtype).unwrap();
    assert_eq!(expected.len(), whole.packed_size());

    let chunked = pack_in_chunks(&mut whole, &buffer, &action.budgets).unwrap();
    assert_eq!(chunked, expected, "chunked pack of {}", action.dtype);

    let options = SpanOptions::new(action.ceiling).with_merge(action.merge);
    let gathered = gather_spans(&mut whole, &buffer, options).unwrap();
    assert_eq!(gathered, expected, "spans of {}", action.dtype);

    let mut restored = vec![0u8; len];
    let mut last = LAST_UNBOUNDED;
    assert_eq!(
        whole.unpack(&mut restored, 0, &mut last, &expected).unwrap(),
        Outcome::Complete
    );
    assert_eq!(whole.unpack_position(), expected.len());

    Corpus::Keep
});
