//! Scripted line-protocol peer for tests.
//!
//! Listens on `127.0.0.1:0`, sends a greeting to every accepted session and
//! answers each `"<id> <command>"` request with the [`Script`] returned by
//! the responder.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::config::{CommandDefinition, PooledTcpConfig, Timeouts};
use crate::connector::Endpoint;

/// Installs a test subscriber once; filter with `RUST_LOG`.
pub(crate) fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("obsrv_protocols=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Greeting without a TLS offer.
pub(crate) const PLAIN_GREETING: &str = "PILAR 1.0 READY\n";

/// Greeting offering the in-band upgrade.
pub(crate) const TLS_GREETING: &str = "PILAR 1.0 READY TLS\n";

/// Response to one request.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    lines: Vec<String>,
    delay: Duration,
    hangup: bool,
}

impl Script {
    /// `"<id> <key>=<value>"` then `"<id> COMMAND COMPLETE"`.
    pub(crate) fn value(id: u32, key: &str, value: &str) -> Self {
        Self {
            lines: vec![format!("{id} {key}={value}"), format!("{id} COMMAND COMPLETE")],
            ..Self::default()
        }
    }

    /// `"<id> COMMAND COMPLETE"`.
    pub(crate) fn complete(id: u32) -> Self {
        Self {
            lines: vec![format!("{id} COMMAND COMPLETE")],
            ..Self::default()
        }
    }

    /// `"<id> COMMAND FAILED"`.
    pub(crate) fn failed(id: u32) -> Self {
        Self {
            lines: vec![format!("{id} COMMAND FAILED")],
            ..Self::default()
        }
    }

    /// No reply at all.
    pub(crate) fn silent() -> Self {
        Self::default()
    }

    /// Closes the session without replying.
    pub(crate) fn hangup() -> Self {
        Self {
            hangup: true,
            ..Self::default()
        }
    }

    /// Waits before replying.
    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = Arc<dyn Fn(u32, &str) -> Script + Send + Sync>;

#[derive(Default)]
struct Counters {
    requests: Mutex<Vec<(u32, String)>>,
    raw_lines: Mutex<Vec<String>>,
    accepted: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Running mock peer; stops on drop.
pub(crate) struct MockPeer {
    addr: SocketAddr,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl MockPeer {
    /// Plain peer answering with `responder`.
    pub(crate) async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(u32, &str) -> Script + Send + Sync + 'static,
    {
        Self::spawn_with(PLAIN_GREETING, None, responder).await
    }

    /// Peer with a custom greeting and reply to `ENC TLS`.
    ///
    /// With `tls_reply` of `None` the session is closed on upgrade requests.
    pub(crate) async fn spawn_with<F>(
        greeting: &'static str,
        tls_reply: Option<&'static str>,
        responder: F,
    ) -> Self
    where
        F: Fn(u32, &str) -> Script + Send + Sync + 'static,
    {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let counters = Arc::new(Counters::default());
        let responder: Responder = Arc::new(responder);

        let task = {
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    counters.accepted.fetch_add(1, Ordering::SeqCst);
                    let counters = Arc::clone(&counters);
                    let responder = Arc::clone(&responder);
                    tokio::spawn(async move {
                        serve(stream, greeting, tls_reply, responder, Arc::clone(&counters)).await;
                        counters.closed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            addr,
            counters,
            task,
        }
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port())
    }

    /// Sessions accepted so far.
    pub(crate) fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Sessions that ended, from either side.
    pub(crate) fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Command texts received, in arrival order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.counters
            .requests
            .lock()
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// `(id, command)` pairs received, in arrival order.
    pub(crate) fn requests(&self) -> Vec<(u32, String)> {
        self.counters.requests.lock().clone()
    }

    /// Every line received, including upgrade requests.
    pub(crate) fn raw_lines(&self) -> Vec<String> {
        self.counters.raw_lines.lock().clone()
    }

    /// Most requests ever being answered at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    greeting: &'static str,
    tls_reply: Option<&'static str>,
    responder: Responder,
    counters: Arc<Counters>,
) {
    let mut stream = BufReader::new(stream);
    if stream.get_mut().write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut line = String::new();
    loop {
        line.clear();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let text = line.trim_end().to_string();
        counters.raw_lines.lock().push(text.clone());

        if text == "ENC TLS" {
            match tls_reply {
                Some(reply) => {
                    let _ = stream.get_mut().write_all(format!("{reply}\n").as_bytes()).await;
                    continue;
                }
                None => return,
            }
        }

        let Some((id, command)) = text
            .split_once(' ')
            .and_then(|(id, command)| Some((id.parse::<u32>().ok()?, command.to_string())))
        else {
            continue;
        };
        counters.requests.lock().push((id, command.clone()));

        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = responder(id, &command);
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if script.hangup {
            return;
        }
        let mut reply = String::new();
        for out in &script.lines {
            reply.push_str(out);
            reply.push('\n');
        }
        if stream.get_mut().write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Mount configuration used across connector tests.
pub(crate) fn mount_config(pool_size: usize, lo: u32, hi: u32) -> PooledTcpConfig {
    PooledTcpConfig::new(pool_size, lo, hi)
        .expect("config")
        .with_timeouts(Timeouts::uniform(Duration::from_secs(1)))
        .with_command("telescope", "rightascension", CommandDefinition::new("MOUNT.RA"))
        .with_command("telescope", "declination", CommandDefinition::new("MOUNT.DEC"))
        .with_command(
            "telescope",
            "tracking",
            CommandDefinition::new("MOUNT.TRACK").with_value(1),
        )
        .with_command("telescope", "slew", CommandDefinition::new("MOUNT.SLEW").with_value(1))
}

/// Answers `GET X` with `X=value` and everything else with a bare completion.
pub(crate) fn echo_responder(value: &'static str) -> impl Fn(u32, &str) -> Script + Send + Sync {
    move |id, command| match command.strip_prefix("GET ") {
        Some(name) => Script::value(id, name, value),
        None => Script::complete(id),
    }
}

/// Polls `condition` every 10ms for up to two seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
