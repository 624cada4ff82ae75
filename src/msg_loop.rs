//! Single-threaded message loop.
//!
//! Messages are kept in a time-ordered queue and handed one at a time to a
//! [`MsgHandler`] running on a dedicated thread. Other threads post
//! fire-and-forget messages (optionally delayed) or make synchronous
//! round-trips that block until the handler posts a reply.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Identifier of a message that expects a reply. `0` means no reply.
pub type MsgId = u64;

/// A queued message together with its reply id.
#[derive(Debug)]
pub struct MsgInfo<M> {
    pub msg: M,
    pub id: MsgId,
}

impl<M> MsgInfo<M> {
    /// Whether the sender is blocked waiting for a reply.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.id != 0
    }
}

/// Runs on the loop thread and consumes every message.
pub trait MsgHandler<M>: Send + 'static {
    fn on_msg_received(&mut self, info: MsgInfo<M>);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Queue<M> {
    /// Keyed by processing time in microseconds since `Shared::epoch`.
    msgs: BTreeMap<u64, MsgInfo<M>>,
    need_stop: bool,
    last_id: MsgId,
}

/// Replies keyed by message id. Only ids in `waiting` still have a sender
/// blocked on them; a reply for any other id is dropped.
struct Replies<R> {
    ready: HashMap<MsgId, R>,
    waiting: HashSet<MsgId>,
}

struct Shared<M, R> {
    queue: Mutex<Queue<M>>,
    cond: Condvar,
    replies: Mutex<Replies<R>>,
    reply_cond: Condvar,
    epoch: Instant,
}

impl<M, R> Shared<M, R> {
    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn enqueue(&self, msg: M, id: MsgId, delay: Duration) {
        let mut q = lock(&self.queue);
        let delay_us = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        let mut time = self.now_us().saturating_add(delay_us);
        while q.msgs.contains_key(&time) {
            tracing::debug!("duplicate message timestamp {}", time);
            time = time.saturating_add(1);
        }
        q.msgs.insert(time, MsgInfo { msg, id });
        self.cond.notify_all();
    }

    fn next_id(&self) -> MsgId {
        let mut q = lock(&self.queue);
        q.last_id = q.last_id.wrapping_add(1);
        if q.last_id == 0 {
            q.last_id = 1;
        }
        q.last_id
    }
}

/// Cloneable handle for posting messages and replies.
pub struct LoopHandle<M, R> {
    shared: Arc<Shared<M, R>>,
}

impl<M, R> Clone for LoopHandle<M, R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M, R> LoopHandle<M, R> {
    /// Queue `msg` for processing after `delay`. No reply is expected.
    pub fn send_async(&self, msg: M, delay: Duration) {
        self.shared.enqueue(msg, 0, delay);
    }

    /// Queue `msg` and block until the handler replies.
    ///
    /// `timeout` of `None` waits forever. Returns `None` if the timeout
    /// expired first.
    pub fn send_sync(&self, msg: M, timeout: Option<Duration>) -> Option<R> {
        let id = self.shared.next_id();
        lock(&self.shared.replies).waiting.insert(id);
        self.shared.enqueue(msg, id, Duration::ZERO);

        let replies = lock(&self.shared.replies);
        let mut replies = match timeout {
            None => self
                .shared
                .reply_cond
                .wait_while(replies, |r| !r.ready.contains_key(&id))
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (mut replies, result) = self
                    .shared
                    .reply_cond
                    .wait_timeout_while(replies, timeout, |r| !r.ready.contains_key(&id))
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    tracing::error!("message {} wait reply timeout", id);
                    replies.waiting.remove(&id);
                    return None;
                }
                replies
            }
        };
        replies.waiting.remove(&id);
        replies.ready.remove(&id)
    }

    /// Deliver the reply for message `id` and wake its sender. The reply is
    /// dropped if the sender already gave up waiting.
    pub fn post_reply(&self, id: MsgId, reply: R) {
        let mut replies = lock(&self.shared.replies);
        if !replies.waiting.contains(&id) {
            tracing::warn!("message {} has no waiter, drop its reply", id);
            return;
        }
        replies.ready.insert(id, reply);
        self.shared.reply_cond.notify_all();
    }

    /// A handle that does not keep the loop alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakLoopHandle<M, R> {
        WeakLoopHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Non-owning [`LoopHandle`], for callbacks that may outlive the loop.
pub struct WeakLoopHandle<M, R> {
    shared: Weak<Shared<M, R>>,
}

impl<M, R> Clone for WeakLoopHandle<M, R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M, R> WeakLoopHandle<M, R> {
    #[must_use]
    pub fn upgrade(&self) -> Option<LoopHandle<M, R>> {
        self.shared.upgrade().map(|shared| LoopHandle { shared })
    }
}

/// Owner of the loop thread.
pub struct MsgLoop<M, R, H> {
    handle: LoopHandle<M, R>,
    thread: Option<JoinHandle<H>>,
}

impl<M, R, H> MsgLoop<M, R, H>
where
    M: Send + 'static,
    R: Send + 'static,
    H: MsgHandler<M>,
{
    /// Start a loop thread called `name`. `make_handler` receives a handle
    /// to the new loop and builds the handler that will run on it.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the thread could not be created.
    pub fn spawn(
        name: &str,
        make_handler: impl FnOnce(LoopHandle<M, R>) -> H,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                msgs: BTreeMap::new(),
                need_stop: false,
                last_id: 0,
            }),
            cond: Condvar::new(),
            replies: Mutex::new(Replies {
                ready: HashMap::new(),
                waiting: HashSet::new(),
            }),
            reply_cond: Condvar::new(),
            epoch: Instant::now(),
        });
        let handle = LoopHandle { shared };
        let handler = make_handler(handle.clone());
        let loop_shared = handle.shared.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || main_loop(&loop_shared, handler))?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn handle(&self) -> &LoopHandle<M, R> {
        &self.handle
    }

    /// Stop the thread, discarding queued messages, and return the handler.
    ///
    /// Returns `None` if the loop was already stopped or the handler panicked.
    pub fn stop(&mut self) -> Option<H> {
        {
            let mut q = lock(&self.handle.shared.queue);
            q.need_stop = true;
            self.handle.shared.cond.notify_all();
        }
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(handler) => Some(handler),
            Err(_) => {
                tracing::error!("message loop thread panicked");
                None
            }
        }
    }
}

impl<M, R, H> Drop for MsgLoop<M, R, H> {
    fn drop(&mut self) {
        let mut q = lock(&self.handle.shared.queue);
        q.need_stop = true;
        self.handle.shared.cond.notify_all();
    }
}

fn main_loop<M, R, H: MsgHandler<M>>(shared: &Shared<M, R>, mut handler: H) -> H {
    loop {
        let info = {
            let mut q = lock(&shared.queue);
            loop {
                if q.need_stop {
                    tracing::info!("stopped, remain {} msg unprocessed", q.msgs.len());
                    q.msgs.clear();
                    return handler;
                }
                let next = q.msgs.keys().next().copied();
                let Some(time) = next else {
                    q = shared.cond.wait(q).unwrap_or_else(PoisonError::into_inner);
                    continue;
                };
                let now = shared.now_us();
                if time > now {
                    q = shared
                        .cond
                        .wait_timeout(q, Duration::from_micros(time - now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    continue;
                }
                if let Some((_, info)) = q.msgs.pop_first() {
                    break info;
                }
            }
        };
        handler.on_msg_received(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct Echo {
        handle: LoopHandle<i32, i32>,
        seen: mpsc::Sender<i32>,
    }

    /// Messages at or above this value sleep `msg - SLOW` ms before replying.
    const SLOW: i32 = 1000;

    impl MsgHandler<i32> for Echo {
        fn on_msg_received(&mut self, info: MsgInfo<i32>) {
            let _ = self.seen.send(info.msg);
            if info.msg >= SLOW {
                let ms = (info.msg - SLOW).unsigned_abs();
                thread::sleep(Duration::from_millis(u64::from(ms)));
            }
            if info.is_sync() && info.msg >= 0 {
                self.handle.post_reply(info.id, info.msg * 2);
            }
        }
    }

    fn echo_loop() -> (MsgLoop<i32, i32, Echo>, mpsc::Receiver<i32>) {
        let (tx, rx) = mpsc::channel();
        let lp = MsgLoop::spawn("test-loop", |handle| Echo { handle, seen: tx }).unwrap();
        (lp, rx)
    }

    #[test]
    fn test_sync_round_trip() {
        let (lp, _rx) = echo_loop();
        assert_eq!(lp.handle().send_sync(21, None), Some(42));
        assert_eq!(lp.handle().send_sync(5, Some(Duration::from_secs(1))), Some(10));
    }

    #[test]
    fn test_sync_timeout() {
        let (lp, _rx) = echo_loop();
        assert_eq!(lp.handle().send_sync(-1, Some(Duration::from_millis(20))), None);
    }

    #[test]
    fn test_late_reply_is_dropped() {
        let (lp, _rx) = echo_loop();
        let late = lp.handle().send_sync(SLOW + 100, Some(Duration::from_millis(10)));
        assert_eq!(late, None);
        // handled after the slow message has posted its reply
        assert_eq!(lp.handle().send_sync(4, None), Some(8));
        let replies = lock(&lp.handle().shared.replies);
        assert!(replies.ready.is_empty());
        assert!(replies.waiting.is_empty());
    }

    #[test]
    fn test_reply_without_waiter_is_dropped() {
        let (lp, _rx) = echo_loop();
        lp.handle().post_reply(77, 1);
        assert!(lock(&lp.handle().shared.replies).ready.is_empty());
        assert_eq!(lp.handle().send_sync(3, Some(Duration::from_secs(1))), Some(6));
    }

    #[test]
    fn test_delayed_messages_run_in_time_order() {
        let (lp, rx) = echo_loop();
        lp.handle().send_async(3, Duration::from_millis(60));
        lp.handle().send_async(1, Duration::ZERO);
        lp.handle().send_async(2, Duration::from_millis(20));
        let got: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn test_stop_discards_pending_and_returns_handler() {
        let (mut lp, rx) = echo_loop();
        lp.handle().send_async(7, Duration::from_secs(60));
        assert!(lp.stop().is_some());
        assert!(rx.try_recv().is_err());
        assert!(lp.stop().is_none());
    }

    #[test]
    fn test_weak_handle_does_not_outlive_loop() {
        let (lp, _rx) = echo_loop();
        let weak = lp.handle().downgrade();
        assert!(weak.upgrade().is_some());
        let mut lp = lp;
        let handler = lp.stop();
        drop(handler);
        drop(lp);
        assert!(weak.upgrade().is_none());
    }
}
