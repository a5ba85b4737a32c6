//! Statistics for client streams
//!
//! The worker owns the stream and updates these counters; handles read them
//! from any task without locking.

use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU8, Ordering};

use crate::session::state::ReadyState;

/// Live counters for one stream
#[derive(Debug, Default)]
pub struct StreamInfo {
    /// Bytes written to the socket for this stream since it was last opened
    byte_count: AtomicI64,
    /// Video frames counted during the last tick
    current_fps: AtomicU16,
    ready_state: AtomicU8,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.byte_count.fetch_add(bytes as i64, Ordering::Relaxed);
    }

    pub fn byte_count(&self) -> i64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    pub fn set_current_fps(&self, fps: u16) {
        self.current_fps.store(fps, Ordering::Relaxed);
    }

    pub fn current_fps(&self) -> u16 {
        self.current_fps.load(Ordering::Relaxed)
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state.as_u8(), Ordering::Release);
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::Acquire))
    }

    /// Reset the counters; the ready state is left alone
    pub fn clear(&self) {
        self.byte_count.store(0, Ordering::Relaxed);
        self.current_fps.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            byte_count: self.byte_count(),
            current_fps: self.current_fps(),
            ready_state: self.ready_state(),
        }
    }
}

/// Point-in-time copy of [`StreamInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub byte_count: i64,
    pub current_fps: u16,
    pub ready_state: ReadyState,
}

impl StreamStats {
    /// Average outgoing bitrate over `secs` seconds
    pub fn bitrate(&self, secs: u64) -> u64 {
        if secs == 0 || self.byte_count <= 0 {
            return 0;
        }
        (self.byte_count as u64 * 8) / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_and_snapshot() {
        let info = StreamInfo::new();
        assert_eq!(info.ready_state(), ReadyState::Initialized);

        info.add_bytes(1000);
        info.add_bytes(500);
        info.set_current_fps(30);
        info.set_ready_state(ReadyState::Publishing);

        let stats = info.snapshot();
        assert_eq!(stats.byte_count, 1500);
        assert_eq!(stats.current_fps, 30);
        assert_eq!(stats.ready_state, ReadyState::Publishing);
    }

    #[test]
    fn test_clear_keeps_state() {
        let info = StreamInfo::new();
        info.add_bytes(42);
        info.set_current_fps(25);
        info.set_ready_state(ReadyState::Open);

        info.clear();
        assert_eq!(info.byte_count(), 0);
        assert_eq!(info.current_fps(), 0);
        assert_eq!(info.ready_state(), ReadyState::Open);
    }

    #[test]
    fn test_bitrate() {
        let stats = StreamStats {
            byte_count: 1_000_000,
            current_fps: 0,
            ready_state: ReadyState::Publishing,
        };
        assert_eq!(stats.bitrate(10), 800_000);
        assert_eq!(stats.bitrate(0), 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let info = Arc::new(StreamInfo::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let info = Arc::clone(&info);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        info.add_bytes(10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(info.byte_count(), 4000);
    }
}
