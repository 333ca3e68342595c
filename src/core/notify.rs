//! Notify tokens
//!
//! A [`NotifyToken`] reports the outcome of one notify send. Exactly one of
//! delivered or lost is ever reported, and only once.
//!
//! Tokens come in three flavours, picked by the transport that creates them:
//! - **empty** ([`NotifyToken::default`]): the send never happened, nothing fires
//! - **delivered** ([`NotifyToken::delivered`]): the outcome is already known,
//!   delivered callbacks run as soon as they are registered
//! - **pending** ([`NotifyToken::pending`]): the outcome arrives later through
//!   the paired [`NotifyResolver`]

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Final outcome of a notify send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyOutcome {
    Delivered,
    Lost,
}

type NotifyCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PendingState {
    outcome: Option<NotifyOutcome>,
    on_delivered: Vec<NotifyCallback>,
    on_lost: Vec<NotifyCallback>,
}

#[derive(Clone, Default)]
enum TokenInner {
    #[default]
    Empty,
    Delivered,
    Lost,
    Pending(Arc<Mutex<PendingState>>),
}

/// Handle reporting whether a notify send was delivered or lost
#[derive(Clone, Default)]
pub struct NotifyToken {
    inner: TokenInner,
}

impl NotifyToken {
    /// Token whose send is already known to have arrived
    pub fn delivered() -> Self {
        Self {
            inner: TokenInner::Delivered,
        }
    }

    /// Token whose send is already known to be lost
    pub fn lost() -> Self {
        Self {
            inner: TokenInner::Lost,
        }
    }

    /// Token resolved later through the returned resolver
    pub fn pending() -> (Self, NotifyResolver) {
        let state = Arc::new(Mutex::new(PendingState::default()));
        (
            Self {
                inner: TokenInner::Pending(state.clone()),
            },
            NotifyResolver { state },
        )
    }

    /// True for the token returned by a send on a closed connection
    pub fn is_empty(&self) -> bool {
        matches!(self.inner, TokenInner::Empty)
    }

    /// Outcome so far, `None` while unresolved or for an empty token
    pub fn outcome(&self) -> Option<NotifyOutcome> {
        match &self.inner {
            TokenInner::Empty => None,
            TokenInner::Delivered => Some(NotifyOutcome::Delivered),
            TokenInner::Lost => Some(NotifyOutcome::Lost),
            TokenInner::Pending(state) => lock(state).outcome,
        }
    }

    /// Run `callback` once the send is delivered
    ///
    /// Runs immediately when delivery is already known. Dropped without
    /// running if the send is or becomes lost.
    pub fn on_delivered<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.subscribe(NotifyOutcome::Delivered, Box::new(callback));
    }

    /// Run `callback` once the send is known to be lost
    pub fn on_lost<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.subscribe(NotifyOutcome::Lost, Box::new(callback));
    }

    fn subscribe(&self, wanted: NotifyOutcome, callback: NotifyCallback) {
        match &self.inner {
            TokenInner::Empty => {}
            TokenInner::Delivered => {
                if wanted == NotifyOutcome::Delivered {
                    callback();
                }
            }
            TokenInner::Lost => {
                if wanted == NotifyOutcome::Lost {
                    callback();
                }
            }
            TokenInner::Pending(state) => {
                let mut guard = lock(state);
                let outcome = guard.outcome;
                match outcome {
                    Some(outcome) => {
                        drop(guard);
                        if outcome == wanted {
                            callback();
                        }
                    }
                    None => match wanted {
                        NotifyOutcome::Delivered => guard.on_delivered.push(callback),
                        NotifyOutcome::Lost => guard.on_lost.push(callback),
                    },
                }
            }
        }
    }
}

impl fmt::Debug for NotifyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyToken")
            .field("empty", &self.is_empty())
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Producer side of a pending [`NotifyToken`]
///
/// Dropping an unresolved resolver resolves its token as lost.
pub struct NotifyResolver {
    state: Arc<Mutex<PendingState>>,
}

impl NotifyResolver {
    /// Settle the token. Returns false if it was already settled.
    pub fn resolve(self, outcome: NotifyOutcome) -> bool {
        self.settle(outcome)
    }

    fn settle(&self, outcome: NotifyOutcome) -> bool {
        let callbacks = {
            let mut state = lock(&self.state);
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            let delivered = std::mem::take(&mut state.on_delivered);
            let lost = std::mem::take(&mut state.on_lost);
            match outcome {
                NotifyOutcome::Delivered => delivered,
                NotifyOutcome::Lost => lost,
            }
        };

        for callback in callbacks {
            callback();
        }
        true
    }
}

impl Drop for NotifyResolver {
    fn drop(&mut self) {
        self.settle(NotifyOutcome::Lost);
    }
}

impl fmt::Debug for NotifyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyResolver")
            .field("outcome", &lock(&self.state).outcome)
            .finish()
    }
}

fn lock(state: &Mutex<PendingState>) -> MutexGuard<'_, PendingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
