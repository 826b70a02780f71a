// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Long-lived push streams: pod logs and controller status.
//!
//! A [`StreamSession`] binds one upstream cluster source to one downstream
//! writer and moves `Open -> Streaming -> Closed(reason)`. The session owns
//! both ends, so there is exactly one writer, and the upstream handle is
//! dropped on every exit path, including unwinding.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{future, stream, Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::Agent;
use crate::error::{AgentError, AgentResult, CloseReason};
use crate::status::{ControllerStatus, RolloutPhase};
use crate::types::{ControllerEventStream, ControllerKind, LogOptions, LogStream};

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

/// One message written to the downstream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	/// JSON-encoded record.
	Text(String),
	/// Raw bytes, one log line per frame.
	Binary(Bytes),
	/// Final frame carrying the close reason.
	Close(String),
}

/// The single writer side of a stream session.
#[async_trait]
pub trait Downstream: Send {
	/// Write one frame. A failure means the client is gone.
	async fn send(&mut self, frame: Frame) -> AgentResult<()>;
}

/// Adapts any [`Sink`] of frames, e.g. a websocket sender mapped to frames.
pub struct SinkDownstream<S> {
	sink: S,
}

impl<S> SinkDownstream<S> {
	pub fn new(sink: S) -> Self {
		Self { sink }
	}

	pub fn into_inner(self) -> S {
		self.sink
	}
}

#[async_trait]
impl<S> Downstream for SinkDownstream<S>
where
	S: Sink<Frame> + Unpin + Send,
	S::Error: fmt::Display,
{
	async fn send(&mut self, frame: Frame) -> AgentResult<()> {
		self.sink.send(frame).await.map_err(|e| {
			debug!(error = %e, "downstream write failed");
			AgentError::StreamTerminated(CloseReason::ClientDisconnected)
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
	Open,
	Streaming,
	Closed(CloseReason),
}

/// A cancellable forwarding channel from one cluster source to one client.
pub struct StreamSession<D> {
	id: u64,
	downstream: D,
	cancel: CancellationToken,
	write_timeout: Duration,
	state: SessionState,
}

impl<D: Downstream> StreamSession<D> {
	pub fn new(downstream: D, cancel: CancellationToken, write_timeout: Duration) -> Self {
		Self {
			id: SESSION_IDS.fetch_add(1, Ordering::Relaxed),
			downstream,
			cancel,
			write_timeout,
			state: SessionState::Open,
		}
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn state(&self) -> &SessionState {
		&self.state
	}

	/// Forward `upstream` until either side ends or the token is cancelled.
	///
	/// Returns the close reason; the session is `Closed` afterwards and the
	/// upstream has been dropped.
	pub async fn run<S>(&mut self, upstream: S) -> CloseReason
	where
		S: Stream<Item = AgentResult<Frame>> + Send,
	{
		if let SessionState::Closed(reason) = &self.state {
			return reason.clone();
		}

		let mut upstream = Box::pin(upstream);
		self.state = SessionState::Streaming;
		debug!(session_id = self.id, "stream session attached");

		let reason = loop {
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break CloseReason::Cancelled,
				item = upstream.next() => match item {
					None => break CloseReason::UpstreamEnded,
					Some(Err(e)) => break CloseReason::UpstreamError(e.to_string()),
					Some(Ok(frame)) => {
						if !self.write(frame).await {
							break CloseReason::ClientDisconnected;
						}
					}
				},
			}
		};

		// Release the cluster watch/log handle before anything else.
		drop(upstream);

		if reason != CloseReason::ClientDisconnected {
			let _ = self.write(Frame::Close(reason.to_string())).await;
		}

		info!(session_id = self.id, reason = %reason, "stream session closed");
		self.state = SessionState::Closed(reason.clone());
		reason
	}

	/// Bounded write; false when the client must be treated as gone.
	async fn write(&mut self, frame: Frame) -> bool {
		let write = self.downstream.send(frame);
		tokio::select! {
			biased;
			result = tokio::time::timeout(self.write_timeout, write) => match result {
				Ok(Ok(())) => true,
				Ok(Err(_)) => false,
				Err(_) => {
					warn!(session_id = self.id, "downstream write timed out");
					false
				}
			},
			_ = self.cancel.cancelled() => false,
		}
	}
}

/// Longest log frame emitted; longer lines are split at this length.
pub const MAX_LOG_LINE_BYTES: usize = 64 * 1024;

/// Split raw log chunks into newline-terminated frames. A trailing partial
/// line is flushed when the source ends. A line longer than
/// [`MAX_LOG_LINE_BYTES`] is sent in pieces of that size.
pub fn log_frames(upstream: LogStream) -> impl Stream<Item = AgentResult<Frame>> + Send {
	stream::unfold(
		(upstream, BytesMut::new(), false),
		|(mut upstream, mut buf, mut done)| async move {
			loop {
				let window = buf.len().min(MAX_LOG_LINE_BYTES);
				if let Some(pos) = buf[..window].iter().position(|b| *b == b'\n') {
					let line = buf.split_to(pos + 1).freeze();
					return Some((Ok(Frame::Binary(line)), (upstream, buf, done)));
				}
				if buf.len() >= MAX_LOG_LINE_BYTES {
					let piece = buf.split_to(MAX_LOG_LINE_BYTES).freeze();
					return Some((Ok(Frame::Binary(piece)), (upstream, buf, done)));
				}
				if done {
					if buf.is_empty() {
						return None;
					}
					let rest = buf.split().freeze();
					return Some((Ok(Frame::Binary(rest)), (upstream, buf, done)));
				}
				match upstream.next().await {
					Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
					Some(Err(e)) => {
						buf.clear();
						done = true;
						let err = AgentError::upstream(format!("log stream failed: {e}"));
						return Some((Err(err), (upstream, buf, done)));
					}
					None => done = true,
				}
			}
		},
	)
}

/// Translate controller watch events into JSON status records, skipping
/// records identical to the last one sent for the same object.
pub fn status_frames(upstream: ControllerEventStream) -> impl Stream<Item = AgentResult<Frame>> + Send {
	let mut last: HashMap<String, ControllerStatus> = HashMap::new();
	upstream.filter_map(move |event| {
		let frame = match event {
			Err(e) => Some(Err(e)),
			Ok(event) => {
				let status = ControllerStatus::from_event(&event);
				let key = format!("{}/{}", status.namespace, status.name);
				if last.get(&key) == Some(&status) {
					None
				} else {
					if status.phase == RolloutPhase::Deleted {
						last.remove(&key);
					} else {
						last.insert(key, status.clone());
					}
					Some(
						serde_json::to_string(&status)
							.map(Frame::Text)
							.map_err(|e| AgentError::upstream(format!("failed to encode status: {e}"))),
					)
				}
			}
		};
		future::ready(frame)
	})
}

impl Agent {
	/// Stream a pod's log lines to `downstream` until the session closes.
	///
	/// Fails only if the log source cannot be opened; once streaming, every
	/// outcome is reported as a [`CloseReason`].
	#[instrument(skip(self, opts, downstream, cancel))]
	pub async fn stream_pod_logs<D: Downstream>(
		&self,
		namespace: &str,
		pod: &str,
		opts: LogOptions,
		downstream: D,
		cancel: CancellationToken,
	) -> AgentResult<CloseReason> {
		let upstream = self
			.bounded("open log stream", self.client().stream_logs(namespace, pod, opts))
			.await?;
		let mut session = StreamSession::new(downstream, cancel, self.config().stream_write_timeout());
		Ok(session.run(log_frames(upstream)).await)
	}

	/// Stream normalized rollout status for every controller of `kind` in a
	/// namespace until the session closes.
	#[instrument(skip(self, downstream, cancel))]
	pub async fn stream_controller_status<D: Downstream>(
		&self,
		namespace: &str,
		kind: ControllerKind,
		downstream: D,
		cancel: CancellationToken,
	) -> AgentResult<CloseReason> {
		let upstream = self
			.bounded(
				"open controller watch",
				self.client().watch_controllers(namespace, kind),
			)
			.await?;
		let mut session = StreamSession::new(downstream, cancel, self.config().stream_write_timeout());
		Ok(session.run(status_frames(upstream)).await)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;
	use std::sync::Arc;

	use super::*;
	use crate::testing::RecordingDownstream;

	fn frames(items: Vec<AgentResult<Frame>>) -> impl Stream<Item = AgentResult<Frame>> + Send {
		stream::iter(items)
	}

	fn text(s: &str) -> AgentResult<Frame> {
		Ok(Frame::Text(s.to_string()))
	}

	#[tokio::test]
	async fn upstream_end_closes_session() {
		let downstream = RecordingDownstream::new();
		let mut session = StreamSession::new(
			downstream.clone(),
			CancellationToken::new(),
			Duration::from_secs(1),
		);
		assert_eq!(session.state(), &SessionState::Open);

		let reason = session.run(frames(vec![text("a"), text("b")])).await;

		assert_eq!(reason, CloseReason::UpstreamEnded);
		assert_eq!(session.state(), &SessionState::Closed(CloseReason::UpstreamEnded));
		assert_eq!(
			downstream.frames(),
			vec![
				Frame::Text("a".to_string()),
				Frame::Text("b".to_string()),
				Frame::Close("upstream ended".to_string()),
			]
		);
	}

	#[tokio::test]
	async fn upstream_error_closes_with_reason() {
		let downstream = RecordingDownstream::new();
		let mut session = StreamSession::new(
			downstream.clone(),
			CancellationToken::new(),
			Duration::from_secs(1),
		);
		let reason = session
			.run(frames(vec![text("a"), Err(AgentError::upstream("watch expired"))]))
			.await;
		assert!(matches!(reason, CloseReason::UpstreamError(ref m) if m.contains("watch expired")));
	}

	#[tokio::test]
	async fn failed_write_stops_consuming_upstream() {
		let downstream = RecordingDownstream::failing_after(1);
		let polled = Arc::new(AtomicUsize::new(0));
		let counter = polled.clone();
		let upstream = stream::iter(0..100).map(move |i| {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(Frame::Text(i.to_string()))
		});

		let mut session =
			StreamSession::new(downstream.clone(), CancellationToken::new(), Duration::from_secs(1));
		let reason = session.run(upstream).await;

		assert_eq!(reason, CloseReason::ClientDisconnected);
		assert_eq!(polled.load(Ordering::SeqCst), 2);
		assert_eq!(downstream.frames().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn stalled_write_times_out_as_disconnect() {
		let downstream = RecordingDownstream::stalled();
		let mut session =
			StreamSession::new(downstream, CancellationToken::new(), Duration::from_secs(5));
		let reason = session.run(frames(vec![text("a")])).await;
		assert_eq!(reason, CloseReason::ClientDisconnected);
	}

	#[tokio::test]
	async fn cancellation_closes_idle_session() {
		let downstream = RecordingDownstream::new();
		let cancel = CancellationToken::new();
		let mut session = StreamSession::new(downstream.clone(), cancel.clone(), Duration::from_secs(1));

		cancel.cancel();
		let reason = session.run(stream::pending::<AgentResult<Frame>>()).await;

		assert_eq!(reason, CloseReason::Cancelled);
	}

	#[tokio::test]
	async fn sink_downstream_maps_closed_channel_to_disconnect() {
		let (tx, rx) = futures::channel::mpsc::channel::<Frame>(1);
		drop(rx);
		let mut downstream = SinkDownstream::new(tx);
		let err = downstream.send(Frame::Text("x".to_string())).await.unwrap_err();
		assert!(matches!(
			err,
			AgentError::StreamTerminated(CloseReason::ClientDisconnected)
		));
	}

	#[tokio::test]
	async fn log_frames_split_on_newlines() {
		let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
			Ok(Bytes::from_static(b"first\nsec")),
			Ok(Bytes::from_static(b"ond\nthird")),
		];
		let upstream: LogStream = Box::pin(stream::iter(chunks));
		let out: Vec<_> = log_frames(upstream).collect().await;
		let lines: Vec<Frame> = out.into_iter().map(|f| f.unwrap()).collect();
		assert_eq!(
			lines,
			vec![
				Frame::Binary(Bytes::from_static(b"first\n")),
				Frame::Binary(Bytes::from_static(b"second\n")),
				Frame::Binary(Bytes::from_static(b"third")),
			]
		);
	}

	#[tokio::test]
	async fn newline_free_output_is_framed_before_the_source_ends() {
		let chunk = Bytes::from(vec![b'x'; 1024 * 1024]);
		let chunks = stream::iter((0..16).map(move |_| Ok::<_, std::io::Error>(chunk.clone())));
		let upstream: LogStream = Box::pin(chunks.chain(stream::pending()));
		let expected = 16 * 1024 * 1024 / MAX_LOG_LINE_BYTES;

		let out: Vec<_> = tokio::time::timeout(
			Duration::from_secs(5),
			log_frames(upstream).take(expected).collect::<Vec<_>>(),
		)
		.await
		.expect("frames emitted while the source stays open");

		assert_eq!(out.len(), expected);
		for frame in out {
			match frame.unwrap() {
				Frame::Binary(bytes) => assert_eq!(bytes.len(), MAX_LOG_LINE_BYTES),
				other => panic!("unexpected frame {other:?}"),
			}
		}
	}

	#[tokio::test]
	async fn long_line_is_split_at_the_limit() {
		let mut line = vec![b'a'; MAX_LOG_LINE_BYTES + 10];
		line.push(b'\n');
		let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Ok(Bytes::from(line))];
		let upstream: LogStream = Box::pin(stream::iter(chunks));

		let out: Vec<Frame> = log_frames(upstream).map(|f| f.unwrap()).collect().await;

		assert_eq!(out.len(), 2);
		assert_eq!(out[0], Frame::Binary(Bytes::from(vec![b'a'; MAX_LOG_LINE_BYTES])));
		assert_eq!(out[1], Frame::Binary(Bytes::from_static(b"aaaaaaaaaa\n")));
	}
}
