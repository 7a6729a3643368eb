//! In-process task queue.
//!
//! Unbounded FIFO of leased work. One actor task owns the buffer and the
//! parked poppers, and its command channel is the single arbitration point:
//! push, pop, and snapshot are each atomic relative to the others. Nothing
//! here is durable; a leased item lost with this process is re-leased once
//! its attempt times out at the hub.

use std::collections::VecDeque;

use gantry_rpc::wire::LeasedWork;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

enum Command {
    Push(LeasedWork),
    Pop(oneshot::Sender<LeasedWork>),
    Items(oneshot::Sender<Vec<LeasedWork>>),
}

/// Handle to the queue actor. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// Add an item. Never blocks the producer.
    pub fn push(&self, work: LeasedWork) {
        debug!(work = %work.work_id, "queue push");
        let _ = self.tx.send(Command::Push(work));
    }

    /// Take the oldest item, waiting until one exists. `None` only after
    /// the queue actor has shut down.
    pub async fn pop(&self) -> Option<LeasedWork> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::Pop(tx)).ok()?;
        rx.await.ok()
    }

    /// A point-in-time snapshot of the queued items, oldest first.
    pub async fn items(&self) -> Vec<LeasedWork> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Items(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut items: VecDeque<LeasedWork> = VecDeque::new();
    let mut waiters: VecDeque<oneshot::Sender<LeasedWork>> = VecDeque::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Push(mut work) => {
                // Hand straight to a parked popper when one is waiting;
                // a dropped popper just passes the item along.
                loop {
                    match waiters.pop_front() {
                        Some(waiter) => match waiter.send(work) {
                            Ok(()) => break,
                            Err(returned) => work = returned,
                        },
                        None => {
                            items.push_back(work);
                            break;
                        }
                    }
                }
            }
            Command::Pop(waiter) => match items.pop_front() {
                Some(work) => {
                    if let Err(returned) = waiter.send(work) {
                        items.push_front(returned);
                    }
                }
                None => waiters.push_back(waiter),
            },
            Command::Items(reply) => {
                let _ = reply.send(items.iter().cloned().collect());
            }
        }
    }
}
