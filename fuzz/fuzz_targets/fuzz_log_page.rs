//! Fuzz target for log page handling.
//!
//! Arbitrary page bodies must parse or fail cleanly, and ordering must hold
//! for whatever parses.

#![no_main]

use libfuzzer_sys::fuzz_target;
use site_replication::event::LogPage;

fuzz_target!(|data: (u64, &[u8])| {
    let (after, body) = data;
    let Ok(page) = serde_json::from_slice::<LogPage>(body) else {
        return;
    };

    let _ = page.next_cursor();
    let ordered = page.ordered_after(after);
    assert!(ordered.iter().all(|e| e.seq > after));
    assert!(ordered.windows(2).all(|w| w[0].seq <= w[1].seq));
});
