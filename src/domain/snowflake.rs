//! Distributed id generator for [`FileOwnership`](super::FileOwnership)
//! and [`FileToken`](super::FileToken) ids, grounded on the original
//! source's use of `github.com/xybor-x/snowflake`: a 41-bit millisecond
//! timestamp, a 10-bit node id (the `snowflake_node` config value), and
//! a 12-bit per-millisecond sequence, packed into a single `i64` the RPC
//! surface carries as `int64`. Unlike the random capability tokens
//! (upload/session tokens), these ids are monotonic and globally unique
//! across a small, known set of nodes rather than unguessable.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2024-01-01T00:00:00Z, in milliseconds since the Unix epoch. Custom
/// epochs are the norm for snowflake-style ids; this one simply buys a
/// few extra decades before the 41-bit timestamp field overflows.
const EPOCH_MILLIS: u64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

struct State {
    last_millis: u64,
    sequence: u16,
}

/// Generates monotonically-increasing 63-bit ids scoped to one
/// `node_id`. Cheap to clone; the mutex only ever guards a pair of
/// integers and is never held across an `.await`.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node_id: u16,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// `node_id` must fit in [`NODE_BITS`] bits; values above
    /// `MAX_NODE` are masked down rather than rejected, since a
    /// misconfigured node id is a deploy-time concern rather than a
    /// request-time error.
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: node_id & MAX_NODE,
            state: Mutex::new(State {
                last_millis: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = current_millis();

        if now < state.last_millis {
            // Clock moved backwards (NTP step); stall on the last
            // known-good millisecond rather than risk reissuing an id.
            now = state.last_millis;
        }

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                now = wait_next_millis(state.last_millis);
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        let timestamp_part = (now - EPOCH_MILLIS) as i64;
        (timestamp_part << (NODE_BITS + SEQUENCE_BITS))
            | ((self.node_id as i64) << SEQUENCE_BITS)
            | (state.sequence as i64)
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn wait_next_millis(last: u64) -> u64 {
    let mut now = current_millis();
    while now <= last {
        std::thread::yield_now();
        now = current_millis();
    }
    now
}
