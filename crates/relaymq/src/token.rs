//! Completion handles returned by every client operation.
//!
//! A [`Token`] completes exactly once, either with the acknowledgment packet
//! that finished the operation or with an error. Waiters and the optional
//! callback observe the outcome only after it has been stored.

use parking_lot::{Condvar, Mutex};
use relaymq_protocol::{MqttError, Packet, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type CompletionCallback = Box<dyn FnOnce(&Token) + Send>;

/// Outcome of a completed operation: the acknowledgment, if the operation has one.
pub type TokenResult = Result<Option<Packet>>;

#[derive(Clone)]
pub struct Token {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    message_id: Option<u16>,
    state: Mutex<TokenState>,
    completed: Condvar,
    notify: Notify,
}

#[derive(Default)]
struct TokenState {
    outcome: Option<TokenResult>,
    callback: Option<CompletionCallback>,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Token")
            .field("message_id", &self.inner.message_id)
            .field("outcome", &state.outcome)
            .finish_non_exhaustive()
    }
}

impl Token {
    pub(crate) fn new(message_id: Option<u16>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                message_id,
                state: Mutex::new(TokenState::default()),
                completed: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Packet identifier of the operation, when it uses one.
    #[must_use]
    pub fn message_id(&self) -> Option<u16> {
        self.inner.message_id
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// The outcome, if the token has completed.
    #[must_use]
    pub fn result(&self) -> Option<TokenResult> {
        self.inner.state.lock().outcome.clone()
    }

    #[must_use]
    pub fn response(&self) -> Option<Packet> {
        match self.result() {
            Some(Ok(packet)) => packet,
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<MqttError> {
        match self.result() {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    /// Attaches application data retrievable from the callback.
    pub fn set_context(&self, context: Arc<dyn Any + Send + Sync>) {
        self.inner.state.lock().context = Some(context);
    }

    #[must_use]
    pub fn context(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.state.lock().context.clone()
    }

    /// Runs `callback` once the token completes. A token that is already
    /// complete runs it right away on the calling thread. A later registration
    /// replaces one that has not run yet.
    ///
    /// Callbacks of in-flight operations run on the client's event loop and
    /// must return quickly.
    pub fn on_complete(&self, callback: impl FnOnce(&Token) + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_none() {
                state.callback = Some(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Blocks the current thread until completion.
    ///
    /// Must not be called from inside an async task; use [`wait`](Self::wait).
    pub fn wait_blocking(&self) -> TokenResult {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.inner.completed.wait(&mut state);
        }
    }

    /// Blocks up to `timeout`. Expiry fails with [`MqttError::Timeout`] but
    /// leaves the operation running.
    pub fn wait_blocking_timeout(&self, timeout: Duration) -> TokenResult {
        let mut state = self.inner.state.lock();
        if state.outcome.is_none() {
            self.inner.completed.wait_while_for(
                &mut state,
                |state| state.outcome.is_none(),
                timeout,
            );
        }
        state.outcome.clone().unwrap_or(Err(MqttError::Timeout))
    }

    pub async fn wait(&self) -> TokenResult {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.result() {
                return outcome;
            }
            notified.await;
        }
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> TokenResult {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| MqttError::Timeout)?
    }

    /// Returns false when the token had already completed.
    pub(crate) fn complete(&self, response: Option<Packet>) -> bool {
        self.finish(Ok(response))
    }

    pub(crate) fn fail(&self, error: MqttError) -> bool {
        self.finish(Err(error))
    }

    fn finish(&self, outcome: TokenResult) -> bool {
        let callback = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            state.callback.take()
        };
        self.inner.completed.notify_all();
        self.inner.notify.notify_waiters();
        if let Some(callback) = callback {
            callback(self);
        }
        true
    }
}
