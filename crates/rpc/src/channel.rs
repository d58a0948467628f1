use std::{io, sync::Arc};

use async_channel as chan;
use futures::{SinkExt, StreamExt};
use tokio::{
	io::{AsyncRead, AsyncWrite},
	spawn,
};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

/// Outbound half of a transport. Sending must not block: messages are queued and flushed by
/// whoever owns the underlying connection.
pub trait MessageSink: Send + Sync + 'static {
	fn send(&self, message: String) -> io::Result<()>;

	/// Stop accepting messages; the peer observes the end of its inbound stream.
	fn close(&self) {}
}

/// Bidirectional message transport to one plugin host.
///
/// The inbound side is a plain stream of raw messages; when it ends the transport is gone.
pub struct Channel {
	sink: Arc<dyn MessageSink>,
	inbound: chan::Receiver<String>,
}

impl Channel {
	pub fn new(sink: Arc<dyn MessageSink>, inbound: chan::Receiver<String>) -> Self {
		Self { sink, inbound }
	}

	/// Two connected in-process endpoints, used for worker hosts living in the same process.
	#[must_use]
	pub fn memory_pair() -> (Self, Self) {
		let (left_tx, left_rx) = chan::unbounded();
		let (right_tx, right_rx) = chan::unbounded();

		(
			Self::new(Arc::new(QueueSink(left_tx)), right_rx),
			Self::new(Arc::new(QueueSink(right_tx)), left_rx),
		)
	}

	/// Newline delimited messages over a byte stream, e.g. the stdio pipes of a host process.
	pub fn from_io<R, W>(reader: R, writer: W) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (outbound_tx, outbound_rx) = chan::unbounded::<String>();
		let (inbound_tx, inbound_rx) = chan::unbounded::<String>();

		spawn(write_lines(
			FramedWrite::new(writer, LinesCodec::new()),
			outbound_rx,
			inbound_tx.clone(),
		));
		spawn(read_lines(
			FramedRead::new(reader, LinesCodec::new()),
			inbound_tx,
		));

		Self::new(Arc::new(QueueSink(outbound_tx)), inbound_rx)
	}

	pub(crate) fn into_parts(self) -> (Arc<dyn MessageSink>, chan::Receiver<String>) {
		(self.sink, self.inbound)
	}
}

struct QueueSink(chan::Sender<String>);

impl MessageSink for QueueSink {
	fn send(&self, message: String) -> io::Result<()> {
		self.0
			.try_send(message)
			.map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer is gone"))
	}

	fn close(&self) {
		self.0.close();
	}
}

async fn write_lines<W: AsyncWrite + Unpin>(
	mut framed: FramedWrite<W, LinesCodec>,
	outbound_rx: chan::Receiver<String>,
	inbound_tx: chan::Sender<String>,
) {
	while let Ok(line) = outbound_rx.recv().await {
		if let Err(e) = framed.send(line).await {
			error!(?e, "Failed to write rpc message, closing channel");
			// Dropping the writer alone would leave the reader waiting on a dead peer
			inbound_tx.close();
			break;
		}
	}

	debug!("Rpc writer stopped");
}

async fn read_lines<R: AsyncRead + Unpin>(
	mut framed: FramedRead<R, LinesCodec>,
	inbound_tx: chan::Sender<String>,
) {
	while let Some(line) = framed.next().await {
		match line {
			Ok(line) if line.trim().is_empty() => continue,
			Ok(line) => {
				if inbound_tx.send(line).await.is_err() {
					break;
				}
			}
			Err(e) => {
				warn!(?e, "Failed to read rpc message, closing channel");
				break;
			}
		}
	}

	inbound_tx.close();
	debug!("Rpc reader stopped");
}
