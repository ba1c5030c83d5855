//! Single-writer, multi-reader live distribution of one camera's frames.
//!
//! The producer calls [`FrameBroadcaster::push`], which never waits on a
//! viewer. Every viewer holds its own [`Subscription`] cursor and blocks in
//! [`Subscription::recv`] until a newer frame exists, its timeout runs out,
//! or the broadcaster is closed. Slow viewers skip frames; they never see a
//! frame twice or out of order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::core::CameraId;
use crate::core::lock::{lock_mutex, wait_while_timeout};
use crate::frame::EncodedFrame;

#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Default for [`FrameBroadcaster::subscribe`] callers that have no
    /// timeout of their own.
    pub subscribe_timeout: Duration,
    /// Frames retained behind the current one. 0 keeps only the newest.
    pub backlog: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(5),
            backlog: 0,
        }
    }
}

/// Result of one blocking step on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeRead {
    Frame(EncodedFrame),
    /// Nothing new within the timeout. The caller decides whether to
    /// keep waiting.
    Timeout,
    Closed,
}

/// Item of the iterator view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Frame(EncodedFrame),
    NoUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStats {
    pub camera: CameraId,
    pub head_seq: u64,
    pub retained: usize,
    pub subscribers: usize,
    pub closed: bool,
}

struct State {
    // sorted by seq, newest at the back
    frames: VecDeque<EncodedFrame>,
    head_seq: u64,
    closed: bool,
}

pub struct FrameBroadcaster {
    camera: CameraId,
    settings: BroadcastSettings,
    state: Mutex<State>,
    notify: Condvar,
    subscribers: AtomicUsize,
}

impl FrameBroadcaster {
    pub fn new(camera: CameraId, settings: BroadcastSettings) -> Arc<Self> {
        Arc::new(Self {
            camera,
            settings,
            state: Mutex::new(State {
                frames: VecDeque::with_capacity(settings.backlog + 1),
                head_seq: 0,
                closed: false,
            }),
            notify: Condvar::new(),
            subscribers: AtomicUsize::new(0),
        })
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    /// Stores `bytes` as the current frame and wakes every waiting viewer.
    ///
    /// Returns the sequence number assigned to the frame (first push is 1).
    pub fn push(&self, bytes: impl Into<Bytes>, captured_utc_ns: u64) -> u64 {
        let seq = {
            let mut g = lock_mutex(&self.state, "FrameBroadcaster::push");
            g.head_seq += 1;
            let frame = EncodedFrame {
                seq: g.head_seq,
                captured_utc_ns,
                bytes: bytes.into(),
            };
            g.frames.push_back(frame);
            while g.frames.len() > self.settings.backlog + 1 {
                g.frames.pop_front();
            }
            g.head_seq
        };
        self.notify.notify_all();
        seq
    }

    /// Opens a cursor positioned at the current frame: only frames pushed
    /// after this call are delivered.
    pub fn subscribe(self: &Arc<Self>, timeout: Duration) -> Subscription {
        let head = lock_mutex(&self.state, "FrameBroadcaster::subscribe").head_seq;
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        Subscription {
            broadcaster: Arc::clone(self),
            last_seen: head,
            timeout,
        }
    }

    /// Like [`subscribe`](Self::subscribe), but also returns the current
    /// frame. Both are read under one lock, so the cursor sits exactly at the
    /// returned frame and `recv` never hands it out again.
    pub fn subscribe_with_latest(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> (Subscription, Option<EncodedFrame>) {
        let (head, latest) = {
            let g = lock_mutex(&self.state, "FrameBroadcaster::subscribe_with_latest");
            (g.head_seq, g.frames.back().cloned())
        };
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        let sub = Subscription {
            broadcaster: Arc::clone(self),
            last_seen: head,
            timeout,
        };
        (sub, latest)
    }

    /// Marks the stream ended and releases every blocked viewer.
    pub fn close(&self) {
        lock_mutex(&self.state, "FrameBroadcaster::close").closed = true;
        self.notify.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock_mutex(&self.state, "FrameBroadcaster::is_closed").closed
    }

    pub fn latest(&self) -> Option<EncodedFrame> {
        lock_mutex(&self.state, "FrameBroadcaster::latest")
            .frames
            .back()
            .cloned()
    }

    pub fn stats(&self) -> BroadcastStats {
        let g = lock_mutex(&self.state, "FrameBroadcaster::stats");
        BroadcastStats {
            camera: self.camera,
            head_seq: g.head_seq,
            retained: g.frames.len(),
            subscribers: self.subscribers.load(Ordering::Relaxed),
            closed: g.closed,
        }
    }
}

/// Per-viewer cursor into a [`FrameBroadcaster`].
pub struct Subscription {
    broadcaster: Arc<FrameBroadcaster>,
    last_seen: u64,
    timeout: Duration,
}

impl Subscription {
    /// Blocks until a frame newer than the cursor exists, the timeout runs
    /// out, or the broadcaster closes.
    pub fn recv(&mut self) -> SubscribeRead {
        let b = &self.broadcaster;
        let last_seen = self.last_seen;

        let guard = lock_mutex(&b.state, "Subscription::recv");
        let (guard, timed_out) = wait_while_timeout(
            &b.notify,
            guard,
            self.timeout,
            "Subscription::recv",
            |s| !s.closed && s.head_seq == last_seen,
        );

        if guard.closed {
            return SubscribeRead::Closed;
        }
        if timed_out {
            return SubscribeRead::Timeout;
        }

        // oldest retained frame the viewer has not seen yet
        match guard.frames.iter().find(|f| f.seq > last_seen).cloned() {
            Some(frame) => {
                drop(guard);
                self.last_seen = frame.seq;
                SubscribeRead::Frame(frame)
            }
            None => SubscribeRead::Timeout,
        }
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn camera(&self) -> CameraId {
        self.broadcaster.camera
    }
}

impl Iterator for Subscription {
    type Item = Update;

    fn next(&mut self) -> Option<Update> {
        match self.recv() {
            SubscribeRead::Frame(frame) => Some(Update::Frame(frame)),
            SubscribeRead::Timeout => Some(Update::NoUpdate),
            SubscribeRead::Closed => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    fn broadcaster(backlog: usize) -> Arc<FrameBroadcaster> {
        FrameBroadcaster::new(
            CameraId(0),
            BroadcastSettings {
                subscribe_timeout: SHORT,
                backlog,
            },
        )
    }

    #[test]
    fn latest_is_none_before_first_push() {
        let b = broadcaster(0);
        assert!(b.latest().is_none());
        assert_eq!(b.push(vec![1u8], 0), 1);
        assert_eq!(b.push(vec![2u8], 0), 2);
        let latest = b.latest().unwrap();
        assert_eq!(latest.seq, 2);
        assert_eq!(&latest.bytes[..], &[2]);
    }

    #[test]
    fn subscribe_with_latest_positions_cursor_at_returned_frame() {
        let b = broadcaster(0);
        let (mut sub, first) = b.subscribe_with_latest(SHORT);
        assert!(first.is_none());
        assert_eq!(sub.recv(), SubscribeRead::Timeout);

        b.push(vec![1u8], 0);
        let (mut sub, first) = b.subscribe_with_latest(SHORT);
        assert_eq!(first.map(|f| f.seq), Some(1));
        assert_eq!(sub.last_seen(), 1);
        assert_eq!(sub.recv(), SubscribeRead::Timeout);

        b.push(vec![2u8], 0);
        assert!(matches!(sub.recv(), SubscribeRead::Frame(f) if f.seq == 2));
        assert_eq!(b.stats().subscribers, 1);
    }

    #[test]
    fn recv_returns_newest_and_skips() {
        let b = broadcaster(0);
        let mut sub = b.subscribe(SHORT);
        b.push(vec![1u8], 0);
        b.push(vec![2u8], 0);
        b.push(vec![3u8], 0);

        match sub.recv() {
            SubscribeRead::Frame(f) => assert_eq!(f.seq, 3),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(sub.recv(), SubscribeRead::Timeout);
    }

    #[test]
    fn backlog_lets_slow_viewer_catch_up_in_order() {
        let b = broadcaster(2);
        let mut sub = b.subscribe(SHORT);
        for i in 1..=5u8 {
            b.push(vec![i], 0);
        }

        // frames 3, 4 and 5 are retained; 1 and 2 are gone
        let seqs: Vec<u64> = (0..3)
            .map(|_| match sub.recv() {
                SubscribeRead::Frame(f) => f.seq,
                other => panic!("expected frame, got {:?}", other),
            })
            .collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert_eq!(sub.recv(), SubscribeRead::Timeout);
        assert_eq!(b.stats().retained, 3);
    }

    #[test]
    fn closed_ends_iterator() {
        let b = broadcaster(0);
        let mut sub = b.subscribe(SHORT);
        b.push(vec![9u8], 0);
        b.close();
        assert!(b.is_closed());
        assert_eq!(sub.next(), None);
        assert_eq!(sub.recv(), SubscribeRead::Closed);
    }

    #[test]
    fn iterator_yields_no_update_on_timeout() {
        let b = broadcaster(0);
        let mut sub = b.subscribe(SHORT);
        assert_eq!(sub.next(), Some(Update::NoUpdate));
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let b = broadcaster(0);
        let a = b.subscribe(SHORT);
        let c = b.subscribe(SHORT);
        assert_eq!(b.stats().subscribers, 2);
        drop(a);
        assert_eq!(b.stats().subscribers, 1);
        drop(c);
        assert_eq!(b.stats().subscribers, 0);
    }
}
