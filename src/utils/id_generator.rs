// Start of file: /src/utils/id_generator.rs

/*
    * Snowflake id generation.
    * Layout (most significant first): 41 bits of milliseconds since the epoch,
    * 5 bits datacenter id, 5 bits worker id, 12 bits sequence.
*/

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

/// Default epoch, 2010-11-04T01:42:54.657Z.
pub const DEFAULT_EPOCH_MS: i64 = 1_288_834_974_657;

const WORKER_ID_BITS: u32 = 5;
const DATACENTER_ID_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;

pub const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
pub const MAX_DATACENTER_ID: i64 = (1 << DATACENTER_ID_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_ID_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("worker id must be between 0 and 31, got {0}")]
    InvalidWorkerId(i64),
    #[error("datacenter id must be between 0 and 31, got {0}")]
    InvalidDatacenterId(i64),
    #[error("clock moved backwards, refusing to generate ids for {0}ms")]
    ClockMovedBackwards(i64),
}

/// Fields recovered from an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    pub timestamp_ms: i64,
    pub datacenter_id: i64,
    pub worker_id: i64,
    pub sequence: i64,
}

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: i64,
    sequence: i64,
}

#[derive(Debug)]
pub struct SnowflakeGenerator {
    worker_id: i64,
    datacenter_id: i64,
    epoch_ms: i64,
    state: Mutex<GeneratorState>,
    clock: fn() -> i64,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SnowflakeGenerator {
    pub fn new(worker_id: i64, datacenter_id: i64) -> Result<Self, SnowflakeError> {
        Self::with_epoch(worker_id, datacenter_id, DEFAULT_EPOCH_MS)
    }

    pub fn with_epoch(worker_id: i64, datacenter_id: i64, epoch_ms: i64) -> Result<Self, SnowflakeError> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(SnowflakeError::InvalidWorkerId(worker_id));
        }
        if !(0..=MAX_DATACENTER_ID).contains(&datacenter_id) {
            return Err(SnowflakeError::InvalidDatacenterId(datacenter_id));
        }

        Ok(Self {
            worker_id,
            datacenter_id,
            epoch_ms,
            state: Mutex::new(GeneratorState { last_timestamp: -1, sequence: 0 }),
            clock: now_ms,
        })
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn next_id(&self) -> Result<i64, SnowflakeError> {
        let mut state = self.state.lock();
        let mut timestamp: i64 = (self.clock)();

        if timestamp < state.last_timestamp {
            return Err(SnowflakeError::ClockMovedBackwards(state.last_timestamp - timestamp));
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // * sequence exhausted for this millisecond
                while timestamp <= state.last_timestamp {
                    std::hint::spin_loop();
                    timestamp = (self.clock)();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;

        Ok(((timestamp - self.epoch_ms) << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_ID_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }

    pub fn parse_id(&self, id: i64) -> SnowflakeParts {
        SnowflakeParts {
            timestamp_ms: (id >> TIMESTAMP_SHIFT) + self.epoch_ms,
            datacenter_id: (id >> DATACENTER_ID_SHIFT) & MAX_DATACENTER_ID,
            worker_id: (id >> WORKER_ID_SHIFT) & MAX_WORKER_ID,
            sequence: id & SEQUENCE_MASK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rejects_out_of_range_ids() {
        assert_eq!(SnowflakeGenerator::new(32, 0).unwrap_err(), SnowflakeError::InvalidWorkerId(32));
        assert_eq!(SnowflakeGenerator::new(0, -1).unwrap_err(), SnowflakeError::InvalidDatacenterId(-1));
        assert!(SnowflakeGenerator::new(31, 31).is_ok());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator: SnowflakeGenerator = SnowflakeGenerator::new(3, 7).unwrap();
        let ids: Vec<i64> = (0..10_000).map(|_| generator.next_id().unwrap()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());

        let parts: SnowflakeParts = generator.parse_id(ids[0]);
        assert_eq!(parts.worker_id, 3);
        assert_eq!(parts.datacenter_id, 7);
        assert!((parts.timestamp_ms - now_ms()).abs() < 60_000);
    }

    #[test]
    fn packs_fields_at_fixed_offsets() {
        fn fixed() -> i64 {
            DEFAULT_EPOCH_MS + 1
        }
        let generator: SnowflakeGenerator = SnowflakeGenerator::new(1, 2).unwrap().with_clock(fixed);
        let id: i64 = generator.next_id().unwrap();
        assert_eq!(id, (1 << 22) | (2 << 17) | (1 << 12));
    }

    #[test]
    fn detects_clock_moving_backwards() {
        fn past() -> i64 {
            DEFAULT_EPOCH_MS + 10
        }
        let generator: SnowflakeGenerator = SnowflakeGenerator::new(0, 0).unwrap().with_clock(past);
        generator.state.lock().last_timestamp = DEFAULT_EPOCH_MS + 15;
        assert_eq!(generator.next_id(), Err(SnowflakeError::ClockMovedBackwards(5)));
    }
}

// End of file: /src/utils/id_generator.rs
