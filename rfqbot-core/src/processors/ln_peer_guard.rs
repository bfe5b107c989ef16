//! Lightning routing-peer guard.
//!
//! Keeps one Lightning peer connected. Every interval the guard lists the
//! node's peers; when the configured peer is missing it probes the peer's
//! TCP endpoint and asks the node to connect. Reconnect attempts are spaced
//! by a cooldown, except right after a disconnect or when forced.

use crate::bridge::{ToolError, ToolSurface};
use crate::utils::clock::now_ms;
use async_trait::async_trait;
use rfqbot_sdk::config::LnGuardConfig;
use rfqbot_sdk::objects::tools::{LN_CONNECT, LN_LISTPEERS};
use serde::Serialize;
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_RECONNECT_COOLDOWN: Duration = Duration::from_secs(1);
pub const MIN_TCP_TIMEOUT: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Peer URI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerUriError {
    #[error("peer URI is required")]
    Empty,
    #[error("peer URI must be nodeid@host:port")]
    MissingSeparator,
    #[error("peer URI node id must be 33-byte hex (66 chars)")]
    InvalidNodeId,
    #[error("peer URI missing host:port")]
    MissingAddress,
    #[error("peer URI ipv6 address missing closing ]")]
    UnclosedIpv6,
    #[error("peer URI must include host:port")]
    MissingPort,
    #[error("peer URI host is empty")]
    EmptyHost,
    #[error("peer URI port is invalid")]
    InvalidPort,
}

/// `nodeid@host:port`, with IPv6 hosts in brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerUri {
    /// Lowercase 66-character hex node id.
    pub node_id: String,
    /// The `host:port` part as written.
    pub addr: String,
    pub host: String,
    pub port: u16,
}

impl PeerUri {
    pub fn parse(raw: &str) -> Result<Self, PeerUriError> {
        let peer = raw.trim();
        if peer.is_empty() {
            return Err(PeerUriError::Empty);
        }
        let (node_id, addr) = match peer.split_once('@') {
            Some((node_id, addr)) if !node_id.is_empty() => (node_id, addr),
            _ => return Err(PeerUriError::MissingSeparator),
        };
        let node_id = node_id.trim().to_ascii_lowercase();
        if !is_node_id(&node_id) {
            return Err(PeerUriError::InvalidNodeId);
        }
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(PeerUriError::MissingAddress);
        }

        let (host, port) = if let Some(bracketed) = addr.strip_prefix('[') {
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or(PeerUriError::UnclosedIpv6)?;
            let port = rest
                .trim()
                .strip_prefix(':')
                .ok_or(PeerUriError::MissingPort)?;
            (host.trim(), port)
        } else {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() => (host.trim(), port),
                _ => return Err(PeerUriError::MissingPort),
            }
        };

        if host.is_empty() {
            return Err(PeerUriError::EmptyHost);
        }
        let port = match port.trim().parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(PeerUriError::InvalidPort),
        };

        Ok(Self {
            node_id,
            addr: addr.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl FromStr for PeerUri {
    type Err = PeerUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_node_id(value: &str) -> bool {
    value.len() == 66 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Node ids of the connected peers in a `listpeers` result, in order of
/// first appearance.
///
/// Rows carry the id as `id`, `pub_key` or `pubKey`. A row without a
/// `connected` field counts as connected.
pub fn extract_connected_peer_ids(list_peers: &Value) -> Vec<String> {
    let Some(rows) = list_peers.get("peers").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut ids: Vec<String> = Vec::new();
    for row in rows {
        let id = ["id", "pub_key", "pubKey"]
            .iter()
            .filter_map(|field| row.get(*field).and_then(Value::as_str))
            .find(|id| !id.is_empty())
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !is_node_id(&id) {
            continue;
        }
        let connected = match row.get("connected") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(connected)) => *connected,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            Some(Value::String(s)) => {
                s.eq_ignore_ascii_case("true") || s.trim().parse::<f64>().ok() == Some(1.0)
            }
            Some(_) => false,
        };
        if connected && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpProbe {
    pub ok: bool,
    pub rtt_ms: Option<u64>,
    pub error: Option<String>,
}

impl TcpProbe {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            rtt_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Open and immediately close a TCP connection to `host:port`.
pub async fn tcp_probe(host: &str, port: u16, timeout: Duration) -> TcpProbe {
    let timeout = timeout.max(MIN_TCP_TIMEOUT);
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => TcpProbe {
            ok: true,
            rtt_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Ok(Err(e)) => TcpProbe::failed(e.to_string()),
        Err(_) => TcpProbe::failed("timeout"),
    }
}

/// The node's view of its peers.
#[async_trait]
pub trait LightningPeers: Send + Sync {
    async fn list_peers(&self) -> Result<Value, ToolError>;
    async fn connect_peer(&self, peer_uri: &str) -> Result<(), ToolError>;
}

/// TCP reachability check, replaceable in tests.
#[async_trait]
pub trait TcpProber: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> TcpProbe;
}

pub struct TokioTcpProber;

#[async_trait]
impl TcpProber for TokioTcpProber {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> TcpProbe {
        tcp_probe(host, port, timeout).await
    }
}

/// [`LightningPeers`] over the peer process's Lightning tools.
pub struct ToolLightningPeers {
    tools: Arc<dyn ToolSurface>,
}

impl ToolLightningPeers {
    pub fn new(tools: Arc<dyn ToolSurface>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl LightningPeers for ToolLightningPeers {
    async fn list_peers(&self) -> Result<Value, ToolError> {
        self.tools.invoke(LN_LISTPEERS, json!({})).await
    }

    async fn connect_peer(&self, peer_uri: &str) -> Result<(), ToolError> {
        self.tools
            .invoke(LN_CONNECT, json!({ "peer": peer_uri }))
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LnProbeStatus {
    pub connected: bool,
    pub listpeers_error: Option<String>,
    pub connect_attempted: bool,
    pub connect_ok: Option<bool>,
    pub connect_error: Option<String>,
    pub listpeers_after_error: Option<String>,
    pub connected_after: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LnProbe {
    pub ts: i64,
    pub peer: String,
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub tcp: TcpProbe,
    pub ln: LnProbeStatus,
    pub duration_ms: i64,
}

impl LnProbe {
    /// Whether the peer ended up connected by any account.
    pub fn reached(&self) -> bool {
        self.ln.connected_after == Some(true) || self.ln.connected || self.ln.connect_ok == Some(true)
    }

    /// The most relevant failure message of the probe.
    pub fn failure(&self) -> String {
        [&self.ln.listpeers_error, &self.ln.connect_error, &self.tcp.error]
            .into_iter()
            .flatten()
            .map(|msg| msg.trim())
            .find(|msg| !msg.is_empty())
            .unwrap_or("probe failed")
            .to_string()
    }
}

fn is_already_connected(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already connected")
}

/// Probe TCP reachability and Lightning connectivity of `peer`, connecting
/// when the peer is not connected, `connect` is set and TCP is reachable.
pub async fn ln_peer_probe(
    peer: &str,
    connect: bool,
    tcp_timeout: Duration,
    peers: &dyn LightningPeers,
    prober: &dyn TcpProber,
) -> Result<LnProbe, PeerUriError> {
    let started_at = now_ms();
    let peer = peer.trim();
    let uri = PeerUri::parse(peer)?;

    let tcp = prober.probe(&uri.host, uri.port, tcp_timeout).await;
    let mut ln = LnProbeStatus::default();

    match peers.list_peers().await {
        Ok(list) => ln.connected = extract_connected_peer_ids(&list).contains(&uri.node_id),
        Err(e) => ln.listpeers_error = Some(e.to_string()),
    }

    if !ln.connected && connect && tcp.ok {
        ln.connect_attempted = true;
        match peers.connect_peer(peer).await {
            Ok(()) => ln.connect_ok = Some(true),
            Err(e) => {
                let message = e.to_string();
                if is_already_connected(&message) {
                    ln.connect_ok = Some(true);
                } else {
                    ln.connect_ok = Some(false);
                    ln.connect_error = Some(message);
                }
            }
        }

        match peers.list_peers().await {
            Ok(list) => {
                ln.connected_after =
                    Some(extract_connected_peer_ids(&list).contains(&uri.node_id))
            }
            Err(e) => ln.listpeers_after_error = Some(e.to_string()),
        }
    }

    Ok(LnProbe {
        ts: started_at,
        peer: peer.to_string(),
        node_id: uri.node_id,
        host: uri.host,
        port: uri.port,
        tcp,
        ln,
        duration_ms: now_ms() - started_at,
    })
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Outcome of one guard tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardTick {
    /// A tick was already in progress.
    Busy,
    /// The peer is connected.
    Ok,
    /// Disconnected, but the previous attempt is too recent.
    Cooldown { remaining_ms: i64 },
    Reconnected,
    Failed { error: String },
    Error { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub ticks: u64,
    pub reconnect_attempts: u64,
    pub reconnect_ok: u64,
    pub reconnect_fail: u64,
    pub last_error: Option<String>,
    pub last_ok_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardStatus {
    pub running: bool,
    pub peer: String,
    pub interval_ms: u64,
    pub reconnect_cooldown_ms: u64,
    pub tcp_timeout_ms: u64,
    pub last_tick_at: Option<i64>,
    pub last_probe: Option<LnProbe>,
    pub stats: GuardStats,
}

#[derive(Debug, Default)]
struct Observed {
    last_tick_at: Option<i64>,
    last_probe: Option<LnProbe>,
    stats: GuardStats,
}

#[derive(Debug, Default)]
struct Connection {
    was_connected: bool,
    last_connect_attempt_at: Option<i64>,
}

pub struct LnPeerGuard {
    peer_uri: String,
    peers: Arc<dyn LightningPeers>,
    prober: Arc<dyn TcpProber>,
    interval: Duration,
    cooldown: Duration,
    tcp_timeout: Duration,
    /// Held for the duration of a tick.
    connection: Mutex<Connection>,
    observed: std::sync::Mutex<Observed>,
    timer: std::sync::Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl LnPeerGuard {
    pub fn new(
        config: &LnGuardConfig,
        peers: Arc<dyn LightningPeers>,
        prober: Arc<dyn TcpProber>,
    ) -> Self {
        Self {
            peer_uri: config.peer_uri.trim().to_string(),
            peers,
            prober,
            interval: Duration::from_millis(config.interval_ms).max(MIN_INTERVAL),
            cooldown: Duration::from_millis(config.reconnect_cooldown_ms)
                .max(MIN_RECONNECT_COOLDOWN),
            tcp_timeout: Duration::from_millis(config.tcp_timeout_ms).max(MIN_TCP_TIMEOUT),
            connection: Mutex::new(Connection::default()),
            observed: std::sync::Mutex::new(Observed::default()),
            timer: std::sync::Mutex::new(None),
        }
    }

    pub fn status(&self) -> GuardStatus {
        let running = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        let observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        GuardStatus {
            running,
            peer: self.peer_uri.clone(),
            interval_ms: self.interval.as_millis() as u64,
            reconnect_cooldown_ms: self.cooldown.as_millis() as u64,
            tcp_timeout_ms: self.tcp_timeout.as_millis() as u64,
            last_tick_at: observed.last_tick_at,
            last_probe: observed.last_probe.clone(),
            stats: observed.stats.clone(),
        }
    }

    fn observe<R>(&self, f: impl FnOnce(&mut Observed) -> R) -> R {
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *observed)
    }

    /// Check the peer once, reconnecting if needed.
    pub async fn tick(&self, force: bool) -> GuardTick {
        let Ok(mut conn) = self.connection.try_lock() else {
            return GuardTick::Busy;
        };
        let now = now_ms();
        self.observe(|o| {
            o.stats.ticks += 1;
            o.last_tick_at = Some(now);
        });

        let outcome = self.check(&mut conn, now, force).await;
        match &outcome {
            GuardTick::Failed { error } => warn!(error = %error, "LN peer reconnect failed"),
            GuardTick::Error { error } => warn!(error = %error, "LN peer guard tick failed"),
            GuardTick::Reconnected => info!(peer = %self.peer_uri, "LN peer reconnected"),
            other => debug!(outcome = ?other, "LN peer guard tick"),
        }
        outcome
    }

    async fn check(&self, conn: &mut Connection, now: i64, force: bool) -> GuardTick {
        let uri = match PeerUri::parse(&self.peer_uri) {
            Ok(uri) => uri,
            Err(e) => return self.errored(conn, e.to_string()),
        };
        let list = match self.peers.list_peers().await {
            Ok(list) => list,
            Err(e) => return self.errored(conn, e.to_string()),
        };

        let connected = extract_connected_peer_ids(&list).contains(&uri.node_id);
        if connected {
            conn.was_connected = true;
            self.observe(|o| {
                o.stats.last_ok_at = Some(now);
                o.stats.last_error = None;
            });
            return GuardTick::Ok;
        }

        let just_disconnected = conn.was_connected;
        let cooldown_ms = self.cooldown.as_millis() as i64;
        let since_attempt = conn.last_connect_attempt_at.map(|at| now - at);
        let cooldown_elapsed = since_attempt.is_none_or(|elapsed| elapsed >= cooldown_ms);
        if !(force || just_disconnected || cooldown_elapsed) {
            conn.was_connected = false;
            return GuardTick::Cooldown {
                remaining_ms: (cooldown_ms - since_attempt.unwrap_or(0)).max(0),
            };
        }

        conn.last_connect_attempt_at = Some(now);
        self.observe(|o| o.stats.reconnect_attempts += 1);
        let probe = match ln_peer_probe(
            &self.peer_uri,
            true,
            self.tcp_timeout,
            self.peers.as_ref(),
            self.prober.as_ref(),
        )
        .await
        {
            Ok(probe) => probe,
            Err(e) => return self.errored(conn, e.to_string()),
        };

        let reached = probe.reached();
        let failure = probe.failure();
        self.observe(|o| {
            o.last_probe = Some(probe);
            if reached {
                o.stats.reconnect_ok += 1;
                o.stats.last_ok_at = Some(now);
                o.stats.last_error = None;
            } else {
                o.stats.reconnect_fail += 1;
                o.stats.last_error = Some(failure.clone());
            }
        });
        conn.was_connected = reached;
        if reached {
            GuardTick::Reconnected
        } else {
            GuardTick::Failed { error: failure }
        }
    }

    fn errored(&self, conn: &mut Connection, error: String) -> GuardTick {
        conn.was_connected = false;
        self.observe(|o| o.stats.last_error = Some(error.clone()));
        GuardTick::Error { error }
    }

    /// Start the periodic loop. The first tick runs immediately. Starting a
    /// running guard only returns its status.
    pub fn start(self: &Arc<Self>) -> GuardStatus {
        {
            let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
            if timer.is_none() {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(Arc::clone(self).run(shutdown_rx));
                *timer = Some((shutdown_tx, handle));
            }
        }
        self.status()
    }

    /// Stop the loop and wait for a tick in progress to finish.
    pub async fn stop(&self) -> GuardStatus {
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((shutdown_tx, handle)) = timer {
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                warn!(error = %e, "LN peer guard loop ended abnormally");
            }
        }
        self.status()
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(peer = %self.peer_uri, interval = ?self.interval, "LnPeerGuard started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = interval.tick() => {
                    self.tick(false).await;
                }
            }
        }
        info!("LnPeerGuard shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ACINQ: &str =
        "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f@3.33.236.230:9735";
    const ACINQ_ID: &str = "03864ef025fde8fb587d989186ce6a4a186895ee44a926bfc370e2c366597a3f8f";

    fn peers(connected: bool) -> Value {
        if connected {
            json!({"peers": [{"pub_key": ACINQ_ID, "connected": true, "netaddr": ["3.33.236.230:9735"]}]})
        } else {
            json!({"peers": []})
        }
    }

    /// Answers `list_peers` from a script indexed by call number; the last
    /// entry repeats.
    struct ScriptedPeers {
        script: Vec<bool>,
        list_calls: AtomicUsize,
        connect_calls: AtomicUsize,
        connect_error: Option<&'static str>,
    }

    impl ScriptedPeers {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script,
                list_calls: AtomicUsize::new(0),
                connect_calls: AtomicUsize::new(0),
                connect_error: None,
            }
        }
    }

    #[async_trait]
    impl LightningPeers for ScriptedPeers {
        async fn list_peers(&self) -> Result<Value, ToolError> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
            let connected = self.script[call.min(self.script.len() - 1)];
            Ok(peers(connected))
        }

        async fn connect_peer(&self, _peer_uri: &str) -> Result<(), ToolError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            match self.connect_error {
                Some(message) => Err(ToolError::rejected(LN_CONNECT, message)),
                None => Ok(()),
            }
        }
    }

    struct FixedProbe(bool);

    #[async_trait]
    impl TcpProber for FixedProbe {
        async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> TcpProbe {
            if self.0 {
                TcpProbe {
                    ok: true,
                    rtt_ms: Some(1),
                    error: None,
                }
            } else {
                TcpProbe::failed("timeout")
            }
        }
    }

    #[test]
    fn test_parse_peer_uri() {
        let uri = PeerUri::parse(ACINQ).unwrap();
        assert_eq!(uri.node_id.len(), 66);
        assert_eq!(uri.host, "3.33.236.230");
        assert_eq!(uri.port, 9735);
        assert_eq!(uri.addr, "3.33.236.230:9735");

        let upper = format!("{}@[::1]:9735", ACINQ_ID.to_uppercase());
        let uri: PeerUri = upper.parse().unwrap();
        assert_eq!(uri.node_id, ACINQ_ID);
        assert_eq!(uri.host, "::1");
    }

    #[test]
    fn test_parse_peer_uri_errors() {
        let id = ACINQ_ID;
        let cases = [
            (String::new(), PeerUriError::Empty),
            ("@host:1".to_string(), PeerUriError::MissingSeparator),
            ("abc@host:1".to_string(), PeerUriError::InvalidNodeId),
            (format!("{id}@"), PeerUriError::MissingAddress),
            (format!("{id}@[::1:9735"), PeerUriError::UnclosedIpv6),
            (format!("{id}@[::1]9735"), PeerUriError::MissingPort),
            (format!("{id}@host"), PeerUriError::MissingPort),
            (format!("{id}@[]:9735"), PeerUriError::EmptyHost),
            (format!("{id}@host:0"), PeerUriError::InvalidPort),
            (format!("{id}@host:65536"), PeerUriError::InvalidPort),
        ];
        for (raw, expected) in cases {
            assert_eq!(PeerUri::parse(&raw), Err(expected), "{raw}");
        }
    }

    #[test]
    fn test_extract_connected_peer_ids() {
        let other = "02".to_string() + &"a".repeat(64);
        let list = json!({"peers": [
            {"id": ACINQ_ID.to_uppercase()},
            {"pub_key": ACINQ_ID, "connected": true},
            {"pubKey": other.clone(), "connected": "true"},
            {"id": "02".to_string() + &"b".repeat(64), "connected": false},
            {"id": "02".to_string() + &"c".repeat(64), "connected": 1},
            {"id": "not-a-node"},
        ]});
        let ids = extract_connected_peer_ids(&list);
        assert_eq!(
            ids,
            vec![ACINQ_ID.to_string(), other, "02".to_string() + &"c".repeat(64)]
        );
        assert!(extract_connected_peer_ids(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_probe_connected_peer_skips_connect() {
        let peers = ScriptedPeers::new(vec![true]);
        let probe = ln_peer_probe(ACINQ, true, Duration::from_millis(10), &peers, &FixedProbe(true))
            .await
            .unwrap();
        assert!(probe.tcp.ok);
        assert!(probe.ln.connected);
        assert!(!probe.ln.connect_attempted);
        assert_eq!(peers.connect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_reconnects_when_tcp_ok() {
        let peers = ScriptedPeers::new(vec![false, true]);
        let probe = ln_peer_probe(ACINQ, true, Duration::from_millis(10), &peers, &FixedProbe(true))
            .await
            .unwrap();
        assert!(probe.ln.connect_attempted);
        assert_eq!(peers.connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.ln.connected_after, Some(true));
        assert!(probe.reached());
    }

    #[tokio::test]
    async fn test_probe_tcp_failure_suppresses_connect() {
        let peers = ScriptedPeers::new(vec![false]);
        let probe = ln_peer_probe(ACINQ, true, Duration::from_millis(10), &peers, &FixedProbe(false))
            .await
            .unwrap();
        assert!(!probe.tcp.ok);
        assert!(!probe.ln.connect_attempted);
        assert_eq!(peers.connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(probe.failure(), "timeout");
    }

    #[tokio::test]
    async fn test_probe_already_connected_counts_as_success() {
        let mut peers = ScriptedPeers::new(vec![false]);
        peers.connect_error = Some("Already connected to peer");
        let probe = ln_peer_probe(ACINQ, true, Duration::from_millis(10), &peers, &FixedProbe(true))
            .await
            .unwrap();
        assert_eq!(probe.ln.connect_ok, Some(true));
        assert!(probe.ln.connect_error.is_none());
    }

    fn guard(peers: Arc<ScriptedPeers>, tcp_ok: bool) -> LnPeerGuard {
        let config = LnGuardConfig {
            peer_uri: ACINQ.to_string(),
            interval_ms: 10_000,
            reconnect_cooldown_ms: 60_000,
            tcp_timeout_ms: 10,
        };
        LnPeerGuard::new(&config, peers, Arc::new(FixedProbe(tcp_ok)))
    }

    #[tokio::test]
    async fn test_guard_reconnects_right_after_disconnect() {
        // ok tick, then: tick sees disconnect, probe lists before and after
        let peers = Arc::new(ScriptedPeers::new(vec![true, false, false, true]));
        let guard = guard(peers.clone(), true);

        assert_eq!(guard.tick(false).await, GuardTick::Ok);
        assert_eq!(peers.connect_calls.load(Ordering::SeqCst), 0);

        assert_eq!(guard.tick(false).await, GuardTick::Reconnected);
        assert_eq!(peers.connect_calls.load(Ordering::SeqCst), 1);

        let status = guard.status();
        assert_eq!(status.stats.ticks, 2);
        assert_eq!(status.stats.reconnect_attempts, 1);
        assert_eq!(status.stats.reconnect_ok, 1);
        assert!(status.last_probe.is_some());
    }

    #[tokio::test]
    async fn test_guard_cooldown_between_failed_attempts() {
        let peers = Arc::new(ScriptedPeers::new(vec![false]));
        let guard = guard(peers.clone(), false);

        assert!(matches!(guard.tick(false).await, GuardTick::Failed { .. }));
        match guard.tick(false).await {
            GuardTick::Cooldown { remaining_ms } => assert!(remaining_ms > 0),
            other => panic!("expected cooldown, got {other:?}"),
        }
        // forcing skips the cooldown
        assert!(matches!(guard.tick(true).await, GuardTick::Failed { .. }));

        let status = guard.status();
        assert_eq!(status.stats.reconnect_attempts, 2);
        assert_eq!(status.stats.reconnect_fail, 2);
        assert_eq!(status.stats.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_guard_invalid_uri_is_an_error() {
        let peers = Arc::new(ScriptedPeers::new(vec![true]));
        let config = LnGuardConfig {
            peer_uri: "nope".to_string(),
            ..LnGuardConfig::default()
        };
        let guard = LnPeerGuard::new(&config, peers, Arc::new(FixedProbe(true)));
        assert!(matches!(guard.tick(false).await, GuardTick::Error { .. }));
    }

    #[test]
    fn test_minimums_are_applied() {
        let config = LnGuardConfig {
            interval_ms: 1,
            reconnect_cooldown_ms: 1,
            tcp_timeout_ms: 1,
            ..LnGuardConfig::default()
        };
        let guard = LnPeerGuard::new(
            &config,
            Arc::new(ScriptedPeers::new(vec![true])),
            Arc::new(FixedProbe(true)),
        );
        let status = guard.status();
        assert_eq!(status.interval_ms, 1_000);
        assert_eq!(status.reconnect_cooldown_ms, 1_000);
        assert_eq!(status.tcp_timeout_ms, 50);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let peers = Arc::new(ScriptedPeers::new(vec![true]));
        let guard = Arc::new(guard(peers, true));
        assert!(guard.start().running);
        let status = guard.stop().await;
        assert!(!status.running);
    }
}
