use std::fmt;
use tokio_util::sync::CancellationToken;

/// Identity of one generation request. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit stop from the user.
    User,
    /// A newer trigger took over.
    Superseded,
}

/// What started a session; selects the system prompt and what gets
/// committed to history on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    Capture,
    Append,
    FollowUp { question: String },
}

/// One in-flight request against the model client.
#[derive(Debug)]
pub struct GenerationSession {
    id: SessionId,
    kind: SessionKind,
    token: CancellationToken,
    reason: Option<CancelReason>,
    output: String,
}

impl GenerationSession {
    pub fn new(id: SessionId, kind: SessionKind) -> Self {
        Self {
            id,
            kind,
            token: CancellationToken::new(),
            reason: None,
            output: String::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    /// Token handed to the streaming task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel with `reason`. Only the first call has any effect; returns
    /// whether this call was it.
    pub fn cancel(&mut self, reason: CancelReason) -> bool {
        if self.reason.is_some() {
            return false;
        }
        self.reason = Some(reason);
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason.is_some()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.reason
    }

    /// Accumulate a fragment. Ignored once cancelled.
    pub fn append_output(&mut self, fragment: &str) {
        if !self.is_cancelled() {
            self.output.push_str(fragment);
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}
