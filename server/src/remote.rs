//! Off-thread access to the engine.
//!
//! The engine is tied to the tick thread. Other threads hold a
//! [`RemoteFacade`], which queues requests on a `crossbeam-channel`; the sync
//! loop answers them at the start of its next tick through a per-request reply
//! channel. While the loop is not running requests are answered with
//! [`LoopError::NotRunning`] instead of waiting for a tick that never comes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use shared::Transform;

use crate::error::{EngineError, LoopError};
use crate::registry::{BodyId, ObjectDescriptor, SyncPolicy};

type Reply<T> = Sender<Result<T, EngineError>>;

/// A request marshalled onto the tick thread.
pub enum FacadeRequest {
    Spawn {
        object: ObjectDescriptor,
        transform: Transform,
        policy: SyncPolicy,
        reply: Reply<BodyId>,
    },
    Remove {
        id: BodyId,
        reply: Reply<()>,
    },
    Query {
        id: BodyId,
        reply: Reply<Transform>,
    },
}

impl FacadeRequest {
    /// Answer without executing.
    pub fn reject(self, err: EngineError) {
        // A dropped reply receiver means the caller gave up; nothing to do.
        match self {
            FacadeRequest::Spawn { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            FacadeRequest::Remove { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            FacadeRequest::Query { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Reply to a request that has been queued but maybe not answered yet.
pub struct PendingReply<T> {
    rx: Receiver<Result<T, EngineError>>,
}

impl<T> PendingReply<T> {
    fn ready(result: Result<T, EngineError>) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the tick thread answers.
    pub fn wait(self) -> Result<T, EngineError> {
        self.rx.recv().map_err(|_| EngineError::EngineGone)?
    }

    /// Block for at most `timeout`; `None` if no answer arrived in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, EngineError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(EngineError::EngineGone)),
        }
    }

    /// Non-blocking poll.
    pub fn try_take(&self) -> Option<Result<T, EngineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(EngineError::EngineGone)),
        }
    }
}

/// `Send + Clone` handle for threads other than the tick thread.
#[derive(Clone)]
pub struct RemoteFacade {
    tx: Sender<FacadeRequest>,
    running: Arc<AtomicBool>,
}

impl RemoteFacade {
    fn submit<T>(&self, make: impl FnOnce(Reply<T>) -> FacadeRequest) -> PendingReply<T> {
        if !self.running.load(Ordering::Acquire) {
            return PendingReply::ready(Err(LoopError::NotRunning.into()));
        }
        let (reply, rx) = bounded(1);
        if self.tx.send(make(reply)).is_err() {
            return PendingReply::ready(Err(EngineError::EngineGone));
        }
        PendingReply { rx }
    }

    pub fn spawn_async(
        &self,
        object: impl Into<ObjectDescriptor>,
        transform: Transform,
        policy: SyncPolicy,
    ) -> PendingReply<BodyId> {
        let object = object.into();
        self.submit(|reply| FacadeRequest::Spawn {
            object,
            transform,
            policy,
            reply,
        })
    }

    pub fn remove_async(&self, id: BodyId) -> PendingReply<()> {
        self.submit(|reply| FacadeRequest::Remove { id, reply })
    }

    pub fn query_async(&self, id: BodyId) -> PendingReply<Transform> {
        self.submit(|reply| FacadeRequest::Query { id, reply })
    }

    /// Blocking spawn. Must not be called from the tick thread.
    pub fn spawn(
        &self,
        object: impl Into<ObjectDescriptor>,
        transform: Transform,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        self.spawn_async(object, transform, policy).wait()
    }

    /// Blocking remove. Must not be called from the tick thread.
    pub fn remove(&self, id: BodyId) -> Result<(), EngineError> {
        self.remove_async(id).wait()
    }

    /// Blocking query. Must not be called from the tick thread.
    pub fn query(&self, id: BodyId) -> Result<Transform, EngineError> {
        self.query_async(id).wait()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Tick-thread end of the request queue.
pub(crate) struct RequestInbox {
    rx: Receiver<FacadeRequest>,
    running: Arc<AtomicBool>,
    remote: RemoteFacade,
}

impl RequestInbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(false));
        Self {
            rx,
            running: running.clone(),
            remote: RemoteFacade { tx, running },
        }
    }

    pub(crate) fn remote(&self) -> RemoteFacade {
        self.remote.clone()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Requests queued right now. Requests sent while draining wait for the next tick.
    pub(crate) fn drain(&self) -> Vec<FacadeRequest> {
        self.rx.try_iter().take(self.rx.len()).collect()
    }

    /// Answer everything queued with `NotRunning`.
    pub(crate) fn reject_pending(&self) -> usize {
        let pending = self.drain();
        let n = pending.len();
        for request in pending {
            request.reject(LoopError::NotRunning.into());
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ShapeDescriptor;

    #[test]
    fn requests_fail_fast_when_not_running() {
        let inbox = RequestInbox::new();
        let remote = inbox.remote();
        let reply = remote.query_async(BodyId(1));
        assert_eq!(
            reply.try_take(),
            Some(Err(EngineError::Loop(LoopError::NotRunning)))
        );
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn queued_requests_wait_for_an_answer() {
        let inbox = RequestInbox::new();
        inbox.set_running(true);
        let remote = inbox.remote();

        let reply = remote.spawn_async(
            ShapeDescriptor::unit_block(),
            Transform::identity(),
            SyncPolicy::PhysicsDrivesHost,
        );
        assert!(reply.try_take().is_none());

        let mut queued = inbox.drain();
        assert_eq!(queued.len(), 1);
        match queued.pop() {
            Some(FacadeRequest::Spawn { reply: tx, .. }) => tx.send(Ok(BodyId(42))).unwrap(),
            _ => panic!("expected a spawn request"),
        }
        assert_eq!(reply.wait(), Ok(BodyId(42)));
    }

    #[test]
    fn pending_requests_are_rejected_on_stop() {
        let inbox = RequestInbox::new();
        inbox.set_running(true);
        let reply = inbox.remote().remove_async(BodyId(3));
        inbox.set_running(false);
        assert_eq!(inbox.reject_pending(), 1);
        assert_eq!(reply.wait(), Err(EngineError::Loop(LoopError::NotRunning)));
    }

    #[test]
    fn dropped_engine_answers_engine_gone() {
        let inbox = RequestInbox::new();
        inbox.set_running(true);
        let remote = inbox.remote();
        let reply = remote.query_async(BodyId(1));
        drop(inbox);
        // Dropping the receiving end discards the queued request and its reply sender.
        assert_eq!(reply.wait(), Err(EngineError::EngineGone));
        assert_eq!(
            remote.query_async(BodyId(1)).wait(),
            Err(EngineError::EngineGone)
        );
    }

    #[test]
    fn remote_is_send() {
        fn assert_send<T: Send + Clone>() {}
        assert_send::<RemoteFacade>();
    }
}
