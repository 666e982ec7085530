//! runtime.rs
//! Cooperative event loop driving one session.
//!
//! User events arrive over a channel, the coalescing deadline is a timer, and
//! view refreshes run on the blocking pool so the loop keeps accepting input.
//! A commit that lands while a refresh is in flight invalidates the affected
//! nodes and closes the views to the old version, so that refresh publishes
//! nothing; the refresh spawned by the commit delivers the new values.

use super::session::{refresh_views, RefreshSummary, Session};
use super::views::{ViewCallback, ViewId};
use crate::compute::NodeKey;
use crate::error::{Error, Result};
use crate::filter::{FilterError, FilterPatch, FilterState};
use crate::indicators::Params;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Submit { patch: FilterPatch, reply: oneshot::Sender<Result<(), FilterError>> },
    Undo { reply: oneshot::Sender<Result<Option<Arc<FilterState>>>> },
    Redo { reply: oneshot::Sender<Result<Option<Arc<FilterState>>>> },
    Subscribe { view: ViewId, indicator: String, params: Params, callback: ViewCallback, reply: oneshot::Sender<Result<NodeKey>> },
    Unsubscribe { view: ViewId, reply: oneshot::Sender<bool> },
    Filter { reply: oneshot::Sender<Arc<FilterState>> },
    Shutdown,
}

/// Cloneable sender side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Validates and queues a patch; it commits once input goes quiet.
    pub async fn submit(&self, patch: FilterPatch) -> Result<()> {
        self.request(|reply| Command::Submit { patch, reply }).await??;
        Ok(())
    }

    pub async fn undo(&self) -> Result<Option<Arc<FilterState>>> { self.request(|reply| Command::Undo { reply }).await? }

    pub async fn redo(&self) -> Result<Option<Arc<FilterState>>> { self.request(|reply| Command::Redo { reply }).await? }

    pub async fn subscribe(
        &self,
        view: ViewId,
        indicator: &str,
        params: Params,
        callback: ViewCallback,
    ) -> Result<NodeKey> {
        let indicator = indicator.to_string();
        self.request(|reply| Command::Subscribe { view, indicator, params, callback, reply }).await?
    }

    pub async fn unsubscribe(&self, view: ViewId) -> Result<bool> {
        self.request(|reply| Command::Unsubscribe { view, reply }).await
    }

    pub async fn filter(&self) -> Result<Arc<FilterState>> { self.request(|reply| Command::Filter { reply }).await }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(Command::Shutdown).await.map_err(|_| Error::SessionClosed)
    }
}

pub struct SessionRuntime;

impl SessionRuntime {
    /// Runs `session` on the current tokio runtime. The join handle yields the
    /// session back after shutdown.
    pub fn spawn(session: Session) -> (SessionHandle, JoinHandle<Session>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(session, rx));
        (SessionHandle { tx }, task)
    }
}

async fn run(mut session: Session, mut rx: mpsc::Receiver<Command>) -> Session {
    let mut refreshes: JoinSet<RefreshSummary> = JoinSet::new();

    loop {
        let deadline = session.deadline().map(Instant::from_std);

        tokio::select! {
            biased;

            cmd = rx.recv() => match cmd {
                None | Some(Command::Shutdown) => break,
                Some(cmd) => {
                    if handle(&mut session, cmd) {
                        spawn_refresh(&session, &mut refreshes);
                    }
                }
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                match session.poll(Instant::now().into_std()) {
                    Ok(Some(_)) => spawn_refresh(&session, &mut refreshes),
                    Ok(None) => {}
                    Err(err) => warn!("filter commit failed: {err}"),
                }
            }

            Some(done) = refreshes.join_next(), if !refreshes.is_empty() => log_refresh(done),
        }
    }

    while let Some(done) = refreshes.join_next().await {
        log_refresh(done);
    }
    debug!(version = session.filter().version(), "session stopped");
    session
}

/// Applies one command. Returns whether subscribed views need a refresh.
fn handle(session: &mut Session, cmd: Command) -> bool {
    match cmd {
        Command::Submit { patch, reply } => {
            let _ = reply.send(session.submit_at(patch, Instant::now().into_std()));
            false
        }
        Command::Undo { reply } => {
            let result = session.undo().map_err(Error::from);
            let changed = matches!(result, Ok(Some(_)));
            let _ = reply.send(result);
            changed
        }
        Command::Redo { reply } => {
            let result = session.redo().map_err(Error::from);
            let changed = matches!(result, Ok(Some(_)));
            let _ = reply.send(result);
            changed
        }
        Command::Subscribe { view, indicator, params, callback, reply } => {
            let result = session.subscribe(view, &indicator, &params, callback).map_err(Error::from);
            let ok = result.is_ok();
            let _ = reply.send(result);
            ok
        }
        Command::Unsubscribe { view, reply } => {
            let _ = reply.send(session.unsubscribe(&view));
            false
        }
        Command::Filter { reply } => {
            let _ = reply.send(session.filter());
            false
        }
        Command::Shutdown => false,
    }
}

fn spawn_refresh(session: &Session, tasks: &mut JoinSet<RefreshSummary>) {
    let graph = Arc::clone(session.graph());
    let views = Arc::clone(session.views());
    tasks.spawn_blocking(move || refresh_views(&graph, &views));
}

fn log_refresh(done: std::result::Result<RefreshSummary, tokio::task::JoinError>) {
    match done {
        Ok(summary) => debug!(
            ready = summary.ready,
            unavailable = summary.unavailable,
            superseded = summary.superseded,
            "views refreshed"
        ),
        Err(err) => warn!("view refresh task failed: {err}"),
    }
}
