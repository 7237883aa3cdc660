// Scripted transport for driving PriceStreamClient without a network

#![allow(dead_code)]

use bithumb_stream::transport::{Connection, Connector, TransportEvent};
use bithumb_stream::{PriceStreamClient, StreamConfig, StreamError};
use bithumb_stream::{ConnectionState, StreamEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Instant};

/// Upper bound for any single wait in a test (virtual time)
pub const WAIT: Duration = Duration::from_secs(600);

/// What the next connect attempt does
pub enum Script {
    /// Connection refused
    Refuse,

    /// Open, emit these events, then report the connection closed
    Frames(Vec<TransportEvent>),

    /// Open and forward whatever the test sends; closed when the sender drops
    Live(mpsc::UnboundedReceiver<TransportEvent>),

    /// Connect never resolves
    Hang,
}

#[derive(Default)]
struct Log {
    scripts: VecDeque<Script>,
    attempts: Vec<Instant>,
    sent: Vec<String>,
    closes: usize,
}

/// Connector that replays scripts in order and refuses once they run out
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    log: Arc<Mutex<Log>>,
}

impl ScriptedConnector {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let connector = Self::default();
        connector.log.lock().unwrap().scripts.extend(scripts);
        connector
    }

    /// Queue a live session and return the sender feeding it
    pub fn push_live(&self) -> mpsc::UnboundedSender<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.log.lock().unwrap().scripts.push_back(Script::Live(rx));
        tx
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.log.lock().unwrap().attempts.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self, _url: &str) -> Result<ScriptedConnection, StreamError> {
        let script = {
            let mut log = self.log.lock().unwrap();
            log.attempts.push(Instant::now());
            log.scripts.pop_front().unwrap_or(Script::Refuse)
        };

        match script {
            Script::Refuse => Err(StreamError::Transport("connection refused".to_string())),
            Script::Hang => futures::future::pending().await,
            Script::Frames(frames) => Ok(ScriptedConnection {
                frames: frames.into(),
                live: None,
                log: self.log.clone(),
            }),
            Script::Live(rx) => Ok(ScriptedConnection {
                frames: VecDeque::new(),
                live: Some(rx),
                log: self.log.clone(),
            }),
        }
    }
}

pub struct ScriptedConnection {
    frames: VecDeque<TransportEvent>,
    live: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    log: Arc<Mutex<Log>>,
}

impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
        self.log.lock().unwrap().sent.push(text);
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(event) = self.frames.pop_front() {
            return event;
        }
        match self.live.as_mut() {
            Some(rx) => rx.recv().await.unwrap_or(TransportEvent::Closed(None)),
            None => TransportEvent::Closed(None),
        }
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

/// Deterministic config: 1s base doubling to 8s, no jitter
pub fn test_config() -> StreamConfig {
    StreamConfig {
        url: "ws://scripted.test/pub/ws".to_string(),
        reconnect_base: Duration::from_secs(1),
        reconnect_max: Duration::from_secs(8),
        reconnect_jitter: 0.0,
        ..StreamConfig::default()
    }
}

/// A `transaction` push with one trade; `time` is KST `HH:MM:SS`
pub fn trade(symbol: &str, price: &str, time: &str) -> TransportEvent {
    TransportEvent::Text(format!(
        r#"{{"type":"transaction","content":{{"list":[{{"symbol":"{}","buySellGb":"2","contPrice":"{}","contQty":"0.5","contAmt":"0","contDtm":"2022-04-25 {}.000000","updn":"up"}}]}}}}"#,
        symbol, price, time
    ))
}

pub async fn wait_for_state(client: &PriceStreamClient, target: ConnectionState) {
    let mut rx = client.watch_state();
    timeout(WAIT, rx.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", target))
        .expect("driver stopped");
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Every state change broadcast so far
pub fn drain_states(events: &mut broadcast::Receiver<StreamEvent>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    states
}
