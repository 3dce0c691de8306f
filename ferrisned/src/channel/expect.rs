//! The send/expect primitive.
//!
//! An [`ExpectEngine`] owns a transport and the buffer of output not yet
//! consumed. [`ExpectEngine::expect`] suspends until one alternative of a
//! pattern set matches or the deadline passes. Expiry is always a
//! [`TransportError::Timeout`], never a matched-but-erroneous result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::buffer::PatternBuffer;
use super::patterns::PatternSet;
use crate::context::{CallerContext, TraceDirection};
use crate::error::{Result, TransportError};
use crate::transport::Transport;

/// Pending output included in a timeout error.
const PENDING_EXCERPT: usize = 256;

/// Result of a successful expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    /// Index of the matching alternative.
    pub index: usize,
    /// Output preceding the match.
    pub before: String,
    /// The matched text.
    pub matched: String,
}

/// Drives a [`Transport`] against ordered pattern sets.
pub struct ExpectEngine<T> {
    transport: T,
    buffer: PatternBuffer,
    tracer: Option<Arc<dyn CallerContext>>,
}

impl<T: Transport> ExpectEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: PatternBuffer::default(),
            tracer: None,
        }
    }

    /// Set how far back already-scanned output is rescanned.
    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.buffer = PatternBuffer::new(depth);
        self
    }

    /// Forward the send/receive trace to a caller context.
    pub fn set_tracer(&mut self, tracer: Option<Arc<dyn CallerContext>>) {
        self.tracer = tracer;
    }

    /// Write `text` followed by a newline.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(&line).await
    }

    /// Write `text` as is.
    pub async fn write(&mut self, text: &str) -> Result<()> {
        debug!("send: {:?}", text);
        if let Some(tracer) = &self.tracer {
            tracer.trace(TraceDirection::Sent, text);
        }
        self.transport.write(text.as_bytes()).await
    }

    /// Wait for the earliest match of any alternative in `set`.
    pub async fn expect(&mut self, set: &PatternSet, timeout: Duration) -> Result<Expected> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(m) = self.buffer.find(set) {
                let (before, matched) = self.buffer.consume(m.start, m.end);
                trace!("matched alternative {}: {:?}", m.index, matched);
                return Ok(Expected {
                    index: m.index,
                    before,
                    matched,
                });
            }
            self.fill(deadline, timeout).await?;
        }
    }

    /// Wait for a literal, typically a command echo. Returns the output
    /// preceding it.
    pub async fn expect_literal(&mut self, text: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((start, end)) = self.buffer.find_literal(text.as_bytes()) {
                let (before, _) = self.buffer.consume(start, end);
                return Ok(before);
            }
            self.fill(deadline, timeout).await?;
        }
    }

    /// Read one chunk into the buffer, failing once `deadline` passes.
    async fn fill(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        let read = tokio::time::timeout_at(deadline.into(), self.transport.read()).await;
        match read {
            Err(_) => Err(TransportError::Timeout {
                after: timeout,
                pending: self.buffer.tail_lossy(PENDING_EXCERPT),
            }
            .into()),
            Ok(Err(e)) => Err(e),
            Ok(Ok(None)) => Err(TransportError::Disconnected.into()),
            Ok(Ok(Some(chunk))) => {
                let before = self.buffer.len();
                self.buffer.extend(&chunk);
                if let Some(tracer) = &self.tracer {
                    let cleaned = self.buffer.tail_lossy(self.buffer.len() - before);
                    tracer.trace(TraceDirection::Received, &cleaned);
                }
                trace!("received {} bytes", chunk.len());
                Ok(())
            }
        }
    }

    /// Discard unconsumed output.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Unconsumed output, for diagnostics.
    pub fn pending(&self) -> String {
        self.buffer.as_str_lossy().into_owned()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Close the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::channel::CompiledPattern;

    /// Transport replaying canned chunks, then hanging.
    struct Replay {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        closed_after: bool,
    }

    impl Replay {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
                written: Vec::new(),
                closed_after: false,
            }
        }
    }

    impl Transport for Replay {
        async fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        async fn read(&mut self) -> Result<Option<Vec<u8>>> {
            match self.chunks.pop_front() {
                Some(chunk) => Ok(Some(chunk)),
                None if self.closed_after => Ok(None),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(TraceDirection, String)>>,
    }

    impl CallerContext for Recorder {
        fn trace(&self, direction: TraceDirection, text: &str) {
            self.lines.lock().unwrap().push((direction, text.to_string()));
        }
    }

    fn prompts() -> PatternSet {
        PatternSet::from_patterns(vec![
            CompiledPattern::new(r"(?m)^\S+\(config-[^)]+\)#").unwrap(),
            CompiledPattern::new(r"(?m)^\S+\(config\)#").unwrap(),
            CompiledPattern::new(r"(?m)^\S+#\s?$").unwrap(),
        ])
    }

    // =========================================================================
    // Matching
    // =========================================================================

    #[tokio::test]
    async fn test_prompt_split_across_reads() {
        let mut engine = ExpectEngine::new(Replay::new(&["hostname r1\r\nr1(con", "fig)#"]));
        let got = engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.index, 1);
        assert_eq!(got.before, "hostname r1\n");
        assert_eq!(got.matched, "r1(config)#");
    }

    #[tokio::test]
    async fn test_earliest_match_wins_over_declaration_order() {
        let mut engine =
            ExpectEngine::new(Replay::new(&["r1(config)#\nr1(config-if)#"]));
        let first = engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.index, 1);
        let second = engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.index, 0);
        assert_eq!(second.before, "\n");
    }

    #[tokio::test]
    async fn test_escape_sequences_removed() {
        let mut engine = ExpectEngine::new(Replay::new(&["\x1b[2Kok\x1b[", "0m\nr1#"]));
        let got = engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.before, "ok\n");
    }

    #[tokio::test]
    async fn test_expect_literal_consumes_echo() {
        let mut engine = ExpectEngine::new(Replay::new(&["description x\nr1(config-if)#"]));
        let before = engine
            .expect_literal("description x", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(before, "");
        let got = engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.before, "\n");
        assert_eq!(got.index, 0);
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[tokio::test]
    async fn test_deadline_is_transport_timeout() {
        let mut engine = ExpectEngine::new(Replay::new(&["Building configuration..."]));
        let err = engine
            .expect(&prompts(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_transport_timeout());
        match err {
            crate::Error::Transport(TransportError::Timeout { pending, .. }) => {
                assert_eq!(pending, "Building configuration...");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_stream_is_disconnect() {
        let mut replay = Replay::new(&["partial"]);
        replay.closed_after = true;
        let mut engine = ExpectEngine::new(replay);
        let err = engine
            .expect(&prompts(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::Disconnected)
        ));
    }

    // =========================================================================
    // Sending and tracing
    // =========================================================================

    #[tokio::test]
    async fn test_send_appends_newline_and_traces() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = ExpectEngine::new(Replay::new(&["r1#"]));
        engine.set_tracer(Some(recorder.clone() as Arc<dyn CallerContext>));
        engine.send("show clock").await.unwrap();
        engine.write("c").await.unwrap();
        engine.expect(&prompts(), Duration::from_secs(1)).await.unwrap();

        assert_eq!(engine.transport().written, b"show clock\nc");
        let lines = recorder.lines.lock().unwrap();
        assert_eq!(lines[0], (TraceDirection::Sent, "show clock\n".to_string()));
        assert_eq!(lines[2], (TraceDirection::Received, "r1#".to_string()));
    }
}
