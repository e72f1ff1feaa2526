//! Full-duplex byte piping between client and backend.
//!
//! # Data Flow
//! ```text
//! client ──read──▶ upstream   ──write──▶ backend
//! client ◀─write── downstream ◀──read── backend
//! ```
//!
//! # Design Decisions
//! - Both directions are polled concurrently inside the session task, so a
//!   stalled writer in one direction never starves the other
//! - EOF on a source shuts down the matching destination (half-close)
//! - Once one direction is done the other may keep streaming; it is cut
//!   only after `linger` passes without a single byte moving
//! - Any I/O error tears down both sides immediately

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::relay::error::RelayError;

/// Tunables for one piping session.
#[derive(Debug, Clone)]
pub struct PipeOptions {
    pub buffer_size: usize,
    /// Inactivity bound for the second direction after the first ends.
    pub linger: Duration,
    /// Close the session after this long without traffic either way.
    pub idle_timeout: Option<Duration>,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
            linger: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

/// Which event started the session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    ClientClosed,
    BackendClosed,
    IdleTimeout,
}

impl PipeEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipeEnd::ClientClosed => "client_closed",
            PipeEnd::BackendClosed => "backend_closed",
            PipeEnd::IdleTimeout => "idle_timeout",
        }
    }
}

/// Byte counts of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
    pub end: PipeEnd,
    /// Both directions reached EOF; false when the session was cut.
    pub clean: bool,
}

/// Last-traffic timestamp shared by both directions.
struct Activity {
    start: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        self.last_ms
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.start.elapsed().saturating_sub(last)
    }
}

/// Pipe bytes both ways until the session is over.
pub async fn pipe<C, B>(client: C, backend: B, opts: &PipeOptions) -> Result<PipeStats, RelayError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_rd, client_wr) = tokio::io::split(client);
    let (backend_rd, backend_wr) = tokio::io::split(backend);

    let up = AtomicU64::new(0);
    let down = AtomicU64::new(0);
    let activity = Activity::new();

    let upstream = copy_one_way(client_rd, backend_wr, opts.buffer_size, &up, &activity);
    let downstream = copy_one_way(backend_rd, client_wr, opts.buffer_size, &down, &activity);
    let idle = idle_watch(&activity, opts.idle_timeout);
    tokio::pin!(upstream, downstream, idle);

    let stats = |end: PipeEnd, clean: bool| PipeStats {
        client_to_backend: up.load(Ordering::Relaxed),
        backend_to_client: down.load(Ordering::Relaxed),
        end,
        clean,
    };
    let failed = |source: io::Error| RelayError::MidStreamIo {
        source,
        client_to_backend: up.load(Ordering::Relaxed),
        backend_to_client: down.load(Ordering::Relaxed),
    };

    let (end, first) = tokio::select! {
        res = &mut upstream => (PipeEnd::ClientClosed, res),
        res = &mut downstream => (PipeEnd::BackendClosed, res),
        _ = &mut idle => return Ok(stats(PipeEnd::IdleTimeout, false)),
    };
    first.map_err(&failed)?;

    // One side is half-closed. The other runs until it ends or stalls for `linger`.
    activity.touch();
    let second = loop {
        let quiet = activity.idle_for();
        if quiet >= opts.linger {
            break None;
        }
        tokio::select! {
            res = &mut upstream, if end == PipeEnd::BackendClosed => break Some(res),
            res = &mut downstream, if end == PipeEnd::ClientClosed => break Some(res),
            _ = &mut idle => break None,
            _ = tokio::time::sleep(opts.linger - quiet) => {}
        }
    };

    match second {
        Some(res) => {
            res.map_err(&failed)?;
            Ok(stats(end, true))
        }
        None => Ok(stats(end, false)),
    }
}

async fn copy_one_way<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    counter: &AtomicU64,
    activity: &Activity,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
        activity.touch();
    }

    match writer.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
        _ => Ok(()),
    }
}

async fn idle_watch(activity: &Activity, limit: Option<Duration>) {
    let Some(limit) = limit else {
        return std::future::pending().await;
    };
    loop {
        let idle = activity.idle_for();
        if idle >= limit {
            return;
        }
        tokio::time::sleep(limit - idle).await;
    }
}
