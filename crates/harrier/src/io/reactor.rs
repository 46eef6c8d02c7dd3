// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The I/O manager: a mio poll loop multiplexing acceptors and
//! connections, a waker-driven command channel, a timer heap, and the
//! worker pool that runs every callback.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      poll() thread                            |
//! |  +--------------------------------------------------------+  |
//! |  |                     mio::Poll                           |  |
//! |  |  - acceptor listeners (accept new connections)         |  |
//! |  |  - connection streams (read/write readiness)           |  |
//! |  |  - waker (commands: write interest, deregister)        |  |
//! |  +--------------------------------------------------------+  |
//! |        |  readable            | writable      | timers       |
//! |        v                      v               v              |
//! |   read task ----------> [ worker pool ] <---- timer task     |
//! |   (fill inbound,         stable ids           (add_timer)    |
//! |    parse, respond)       0..N-1                              |
//! +--------------------------------------------------------------+
//! ```
//!
//! Readable edges become pool tasks (workers parse and answer); writable
//! edges are drained in place on the poll thread. `stop()` breaks the
//! loop, drains the queued callbacks and joins the workers;
//! `request_stop()` only breaks the loop, for callers that *are* workers.

use crate::config::{MAX_EVENTS, POLL_TIMEOUT};
use crate::io::acceptor::Acceptor;
use crate::io::conn::{ConnHandler, Connection};
use crate::io::pool::WorkerPool;
use crate::io::task::Task;
use crossbeam::channel::{unbounded, Receiver, Sender};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Token reserved for the waker.
const WAKER_TOKEN: Token = Token(0);

/// First token handed to acceptors and connections.
const TOKEN_START: usize = 1;

/// What a registered token points at.
pub(crate) enum Entry {
    Conn {
        conn: Arc<Connection>,
        handler: Arc<dyn ConnHandler>,
    },
    Acceptor(Arc<Acceptor>),
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        match self {
            Self::Conn { conn, handler } => Self::Conn {
                conn: conn.clone(),
                handler: handler.clone(),
            },
            Self::Acceptor(a) => Self::Acceptor(a.clone()),
        }
    }
}

/// Cross-thread requests processed on the poll thread.
pub(crate) enum Command {
    /// A worker filled an outbound buffer: arm write interest and flush.
    WriteInterest(Token),
    /// Remove a token's entry and deregister its source.
    Deregister(Token),
}

/// Timer-heap entry, min-ordered by deadline (then submission order).
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest
        // deadline on top.
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.seq.cmp(&self.seq))
    }
}

/// State shared between the poll loop, the pool workers, and every
/// connection/acceptor (which hold it weakly - the registry map inside is
/// what keeps them alive).
pub(crate) struct IoShared {
    pub(crate) registry: Registry,
    waker: Waker,
    cmd_tx: Sender<Command>,
    cmd_rx: Receiver<Command>,
    pub(crate) entries: Mutex<HashMap<Token, Entry>>,
    next_token: AtomicUsize,
    timers: Mutex<BinaryHeap<TimerEntry>>,
    timer_seq: AtomicUsize,
    stopping: AtomicBool,
    pub(crate) pool: WorkerPool,
}

impl IoShared {
    pub(crate) fn next_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::AcqRel))
    }

    pub(crate) fn send_command(&self, command: Command) {
        let _ = self.cmd_tx.send(command);
        if let Err(e) = self.waker.wake() {
            log::warn!("[REACTOR] waker failed: {}", e);
        }
    }

    /// Break the poll loop without joining anything (safe from workers).
    pub(crate) fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

/// The event loop plus its worker pool.
pub struct IoManager {
    shared: Arc<IoShared>,
    poll: Mutex<Option<Poll>>,
}

impl IoManager {
    pub fn new(num_workers: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let pool = WorkerPool::new(num_workers)?;
        let (cmd_tx, cmd_rx) = unbounded();
        let shared = Arc::new(IoShared {
            registry,
            waker,
            cmd_tx,
            cmd_rx,
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicUsize::new(TOKEN_START),
            timers: Mutex::new(BinaryHeap::new()),
            timer_seq: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
            pool,
        });
        Ok(Self {
            shared,
            poll: Mutex::new(Some(poll)),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<IoShared> {
        &self.shared
    }

    pub fn num_workers(&self) -> usize {
        self.shared.pool.size()
    }

    /// Enqueue an immediately-runnable callback. No-op once stopped.
    pub fn add_task(&self, task: Task) {
        self.shared.pool.add_task(task);
    }

    /// Schedule `task` to run on the pool after `delay`.
    pub fn add_timer(&self, delay: Duration, task: Task) {
        let seq = self.shared.timer_seq.fetch_add(1, Ordering::AcqRel) as u64;
        self.shared.timers.lock().push(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            task,
        });
        // Recompute the poll timeout.
        let _ = self.shared.waker.wake();
    }

    /// Register a server-side connection (already-accepted stream) for
    /// reading. Returns the shared connection handle.
    pub fn register_connection(
        &self,
        mut stream: TcpStream,
        handler: Arc<dyn ConnHandler>,
    ) -> io::Result<Arc<Connection>> {
        let token = self.shared.next_token();
        self.shared
            .registry
            .register(&mut stream, token, Interest::READABLE)?;
        let conn = Connection::new(stream, token, Arc::downgrade(&self.shared), true);
        self.shared.entries.lock().insert(
            token,
            Entry::Conn {
                conn: conn.clone(),
                handler,
            },
        );
        Ok(conn)
    }

    /// Start an asynchronous connect. The handler's `conn_done` fires on
    /// a worker once the attempt resolves either way.
    pub fn connect(
        &self,
        addr: SocketAddr,
        handler: Arc<dyn ConnHandler>,
    ) -> io::Result<Arc<Connection>> {
        let mut stream = TcpStream::connect(addr)?;
        let token = self.shared.next_token();
        self.shared.registry.register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        let conn = Connection::new(stream, token, Arc::downgrade(&self.shared), false);
        self.shared.entries.lock().insert(
            token,
            Entry::Conn {
                conn: conn.clone(),
                handler,
            },
        );
        Ok(conn)
    }

    /// Drive the event loop on the calling thread until [`stop`] or
    /// [`request_stop`] breaks it. Call at most once.
    ///
    /// [`stop`]: Self::stop
    /// [`request_stop`]: Self::request_stop
    pub fn poll(&self) {
        let mut poll = match self.poll.lock().take() {
            Some(poll) => poll,
            None => {
                log::error!("[REACTOR] poll() called twice");
                return;
            }
        };
        let mut events = Events::with_capacity(MAX_EVENTS);

        while !self.shared.stopping() {
            self.drain_commands();
            let due = self.fire_due_timers();

            let timeout = self.next_timeout(due);
            if let Err(e) = poll.poll(&mut events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[REACTOR] poll error: {}", e);
                break;
            }

            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    // Commands are drained at the top of the loop.
                    continue;
                }
                let entry = self.shared.entries.lock().get(&event.token()).cloned();
                match entry {
                    None => {} // raced a deregister; stale event
                    Some(Entry::Acceptor(acceptor)) => acceptor.handle_ready(&self.shared),
                    Some(Entry::Conn { conn, handler }) => {
                        if event.is_writable() {
                            conn.handle_writable(&self.shared, &handler);
                        }
                        if event.is_readable() {
                            let conn = conn.clone();
                            let handler = handler.clone();
                            self.shared.pool.add_task(Task::once(move || {
                                Connection::drive_read(&conn, &handler);
                            }));
                        }
                    }
                }
            }
        }

        log::info!("[REACTOR] event loop stopped");
    }

    /// Break the loop and tear the pool down: previously enqueued
    /// callbacks run to completion, then the workers are joined.
    ///
    /// Must not be called from a pool worker (it would join itself); use
    /// [`request_stop`](Self::request_stop) there.
    pub fn stop(&self) {
        self.shared.request_stop();
        self.shared.pool.stop();
    }

    /// Break the loop only. Safe from any thread, including workers; the
    /// thread inside [`poll`](Self::poll) finishes the teardown.
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// True once a stop was requested.
    pub fn stopped(&self) -> bool {
        self.shared.stopping()
    }

    fn drain_commands(&self) {
        while let Ok(command) = self.shared.cmd_rx.try_recv() {
            match command {
                Command::WriteInterest(token) => {
                    let entry = self.shared.entries.lock().get(&token).cloned();
                    if let Some(Entry::Conn { conn, .. }) = entry {
                        conn.arm_write(&self.shared);
                    }
                }
                Command::Deregister(token) => {
                    let entry = self.shared.entries.lock().remove(&token);
                    match entry {
                        Some(Entry::Conn { conn, .. }) => conn.deregister(&self.shared),
                        Some(Entry::Acceptor(_)) | None => {}
                    }
                }
            }
        }
    }

    /// Move expired timers onto the pool. Returns true if any fired.
    fn fire_due_timers(&self) -> bool {
        let now = Instant::now();
        let mut fired = false;
        let mut timers = self.shared.timers.lock();
        while timers.peek().is_some_and(|t| t.deadline <= now) {
            let entry = timers.pop().unwrap();
            self.shared.pool.add_task(entry.task);
            fired = true;
        }
        fired
    }

    fn next_timeout(&self, fired: bool) -> Duration {
        if fired {
            // Re-enter poll immediately so freshly-armed events are not
            // delayed behind the default timeout.
            return Duration::ZERO;
        }
        let timers = self.shared.timers.lock();
        match timers.peek() {
            Some(entry) => entry
                .deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_TIMEOUT),
            None => POLL_TIMEOUT,
        }
    }
}

impl Drop for IoManager {
    fn drop(&mut self) {
        self.stop();
        // Dropping the entries releases every connection and acceptor
        // (they hold the shared state weakly), closing their sockets.
        self.shared.entries.lock().clear();
    }
}
