//! Process-wide metrics counters (§5 "Shared resources"): `duplicate.*`, `atomic_update_failed.*`,
//! `window_closed.*`, `template.*`. Mutex-guarded; a narrow module per §9 "Global process state".

use parking_lot::Mutex;
use std::collections::HashMap;

static COUNTERS: Mutex<Option<HashMap<String, u64>>> = Mutex::new(None);

fn with_counters<R>(f: impl FnOnce(&mut HashMap<String, u64>) -> R) -> R {
    let mut guard = COUNTERS.lock();
    let map = guard.get_or_insert_with(HashMap::new);
    f(map)
}

pub fn increment(key: &str) {
    with_counters(|counters| {
        *counters.entry(key.to_string()).or_insert(0) += 1;
    });
}

pub fn get(key: &str) -> u64 {
    with_counters(|counters| counters.get(key).copied().unwrap_or(0))
}

pub fn snapshot() -> HashMap<String, u64> {
    with_counters(|counters| counters.clone())
}

/// Reset helper for tests.
pub fn reset() {
    with_counters(|counters| counters.clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_and_resets() {
        reset();
        increment("duplicate.whatsapp");
        increment("duplicate.whatsapp");
        assert_eq!(get("duplicate.whatsapp"), 2);
        reset();
        assert_eq!(get("duplicate.whatsapp"), 0);
    }
}
