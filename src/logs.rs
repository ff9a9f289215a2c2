use crate::model::LogLine;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_BUFFER_LINES: usize = 5_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct FeedToken(u64);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedScope {
    pub controller_id: String,
    pub pod_uid: String,
    pub container: Option<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FeedState {
    Idle,
    Opening,
    Streaming,
    Ended,
    Failed,
}

/// Bounded, ordered lines of one pod. Oldest lines fall off first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    limit: usize,
    dropped: usize,
}

impl LogBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_BUFFER_LINES)
    }
}

/// Owns the single live feed. A feed is identified by its token; lines
/// carrying any other token never reach the buffer.
#[derive(Debug, Clone)]
pub struct LogStreamer {
    scope: Option<FeedScope>,
    buffer: LogBuffer,
    token: FeedToken,
    state: FeedState,
    pod_error: String,
}

impl LogStreamer {
    pub fn new(buffer_limit: usize) -> Self {
        Self {
            scope: None,
            buffer: LogBuffer::with_limit(buffer_limit),
            token: FeedToken::default(),
            state: FeedState::Idle,
            pod_error: String::new(),
        }
    }

    pub fn scope(&self) -> Option<&FeedScope> {
        self.scope.as_ref()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn pod_error(&self) -> &str {
        &self.pod_error
    }

    pub fn current_token(&self) -> Option<FeedToken> {
        self.scope.as_ref().map(|_| self.token)
    }

    /// Retargets the streamer. The previous buffer is discarded and a fresh
    /// token issued, so late lines of the old feed are rejected.
    pub fn open(&mut self, scope: FeedScope) -> FeedToken {
        self.token = FeedToken(self.token.0.wrapping_add(1));
        debug!(
            controller = %scope.controller_id,
            pod = %scope.pod_uid,
            container = ?scope.container,
            "opening log feed"
        );
        self.scope = Some(scope);
        self.buffer.clear();
        self.pod_error.clear();
        self.state = FeedState::Opening;
        self.token
    }

    /// Detaches from the current pod. Returns the token of the feed that must
    /// be closed, if one was open.
    pub fn close(&mut self) -> Option<FeedToken> {
        let token = self.current_token();
        self.token = FeedToken(self.token.0.wrapping_add(1));
        self.scope = None;
        self.buffer.clear();
        self.pod_error.clear();
        self.state = FeedState::Idle;
        token
    }

    pub fn feed_opened(&mut self, token: FeedToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.state = FeedState::Streaming;
        true
    }

    pub fn append(&mut self, token: FeedToken, line: LogLine) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.buffer.push(line);
        true
    }

    pub fn feed_failed(&mut self, token: FeedToken, message: impl Into<String>) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.pod_error = message.into();
        self.state = FeedState::Failed;
        true
    }

    pub fn feed_ended(&mut self, token: FeedToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        if self.state != FeedState::Failed {
            self.state = FeedState::Ended;
        }
        true
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.buffer.lines().map(LogLine::render).collect()
    }

    fn is_current(&self, token: FeedToken) -> bool {
        self.scope.is_some() && token == self.token
    }
}

impl Default for LogStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LINES)
    }
}
