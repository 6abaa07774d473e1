//! Every signal carries the connection attempt or retry timer it came
//! from; the driver drops signals that belong to a superseded one.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::CallRecord,
    protocol::{decode_push_frame, PushEvent},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    RetryWait,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Fixed(Duration),
    Backoff { base: Duration, max: Duration },
}

impl RetryPolicy {
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Backoff { base, max } => {
                let exponent = consecutive_failures.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    Connect,
    ScheduleRetry(Duration),
    CancelRetry,
    CloseConnection,
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ChannelState,
    policy: RetryPolicy,
    retry_pending: bool,
    consecutive_failures: u32,
}

impl ReconnectMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ChannelState::Connecting,
            policy,
            retry_pending: false,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    pub fn start(&mut self) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Connecting => vec![ChannelAction::Connect],
            _ => Vec::new(),
        }
    }

    pub fn on_open(&mut self) -> Vec<ChannelAction> {
        if self.state != ChannelState::Connecting {
            return Vec::new();
        }
        self.state = ChannelState::Open;
        self.consecutive_failures = 0;
        self.take_retry()
    }

    pub fn on_closed(&mut self) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Connecting | ChannelState::Open => {
                self.state = ChannelState::RetryWait;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.retry_pending {
                    return Vec::new();
                }
                self.retry_pending = true;
                vec![ChannelAction::ScheduleRetry(
                    self.policy.delay_for(self.consecutive_failures),
                )]
            }
            ChannelState::RetryWait | ChannelState::Stopped => Vec::new(),
        }
    }

    pub fn on_retry_elapsed(&mut self) -> Vec<ChannelAction> {
        if self.state != ChannelState::RetryWait {
            return Vec::new();
        }
        self.retry_pending = false;
        self.state = ChannelState::Connecting;
        vec![ChannelAction::Connect]
    }

    pub fn stop(&mut self) -> Vec<ChannelAction> {
        let mut actions = match self.state {
            ChannelState::Stopped => return Vec::new(),
            ChannelState::Connecting | ChannelState::Open => vec![ChannelAction::CloseConnection],
            ChannelState::RetryWait => Vec::new(),
        };
        actions.extend(self.take_retry());
        self.state = ChannelState::Stopped;
        actions
    }

    fn take_retry(&mut self) -> Vec<ChannelAction> {
        if !self.retry_pending {
            return Vec::new();
        }
        self.retry_pending = false;
        vec![ChannelAction::CancelRetry]
    }
}

#[derive(Debug)]
enum Signal {
    Opened { attempt: u64 },
    Frame { attempt: u64, text: String },
    Closed { attempt: u64, error: ClientError },
    RetryElapsed { timer: u64 },
}

pub struct RetryWake {
    signals: mpsc::UnboundedSender<Signal>,
    timer: u64,
}

impl RetryWake {
    pub fn fire(self) {
        let _ = self.signals.send(Signal::RetryElapsed { timer: self.timer });
    }
}

pub trait RetryTimer: Send {
    fn cancel(self: Box<Self>);
}

pub trait RetryScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, wake: RetryWake) -> Box<dyn RetryTimer>;
}

pub struct TokioRetryScheduler;

struct TokioRetryTimer(JoinHandle<()>);

impl RetryTimer for TokioRetryTimer {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn schedule(&self, delay: Duration, wake: RetryWake) -> Box<dyn RetryTimer> {
        Box::new(TokioRetryTimer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            wake.fire();
        })))
    }
}

#[async_trait]
pub trait LiveUpdateSink: Send + Sync {
    async fn new_call(&self, call: CallRecord);
    async fn channel_state_changed(&self, state: ChannelState, error: Option<ClientError>);
}

pub struct LiveUpdateChannel {
    state: watch::Receiver<ChannelState>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl LiveUpdateChannel {
    pub fn start(url: Url, policy: RetryPolicy, sink: Arc<dyn LiveUpdateSink>) -> Self {
        Self::start_with_scheduler(url, policy, sink, Arc::new(TokioRetryScheduler))
    }

    pub fn start_with_scheduler(
        url: Url,
        policy: RetryPolicy,
        sink: Arc<dyn LiveUpdateSink>,
        scheduler: Arc<dyn RetryScheduler>,
    ) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = ChannelDriver {
            url,
            machine: ReconnectMachine::new(policy),
            scheduler,
            sink,
            signals: signals_tx,
            state: state_tx,
            published: None,
            attempt: 0,
            next_timer: 0,
            pending_timer: None,
            connection: None,
        };
        let driver = tokio::spawn(driver.run(signals_rx, shutdown_rx));

        Self {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(driver) = self.driver.take() {
            if let Err(err) = driver.await {
                warn!(%err, "live update driver ended abnormally");
            }
        }
    }
}

struct ConnectionTask {
    close: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ConnectionTask {
    async fn close(mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
    }
}

struct ChannelDriver {
    url: Url,
    machine: ReconnectMachine,
    scheduler: Arc<dyn RetryScheduler>,
    sink: Arc<dyn LiveUpdateSink>,
    signals: mpsc::UnboundedSender<Signal>,
    state: watch::Sender<ChannelState>,
    published: Option<ChannelState>,
    attempt: u64,
    next_timer: u64,
    pending_timer: Option<(u64, Box<dyn RetryTimer>)>,
    connection: Option<ConnectionTask>,
}

impl ChannelDriver {
    async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<Signal>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!(url = %self.url, "starting live update channel");
        let actions = self.machine.start();
        self.apply(actions, None).await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle(signal).await,
                    None => break,
                },
            }
        }

        let actions = self.machine.stop();
        self.apply(actions, None).await;
        info!(url = %self.url, "live update channel stopped");
    }

    async fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Opened { attempt } if attempt == self.attempt => {
                info!(attempt, "live update channel open");
                let actions = self.machine.on_open();
                self.apply(actions, None).await;
            }
            Signal::Frame { attempt, text } if attempt == self.attempt => {
                self.handle_frame(&text).await;
            }
            Signal::Closed { attempt, error } if attempt == self.attempt => {
                self.connection = None;
                let actions = self.machine.on_closed();
                if !actions.is_empty() {
                    warn!(attempt, %error, "live update channel lost");
                }
                self.apply(actions, Some(error)).await;
            }
            Signal::RetryElapsed { timer } => {
                if self.pending_timer.as_ref().map(|(id, _)| *id) != Some(timer) {
                    return;
                }
                self.pending_timer = None;
                let actions = self.machine.on_retry_elapsed();
                self.apply(actions, None).await;
            }
            stale => debug!(?stale, current = self.attempt, "ignoring signal from old connection"),
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        match decode_push_frame(text) {
            Ok(PushEvent::NewCall(call)) => {
                debug!(call_id = %call.id, "received new_call");
                self.sink.new_call(*call).await;
            }
            Ok(PushEvent::Unrecognized { kind }) => {
                debug!(%kind, "ignoring unrecognized push frame");
            }
            Err(err) => {
                warn!(%err, "dropping malformed push frame");
            }
        }
    }

    async fn apply(&mut self, actions: Vec<ChannelAction>, error: Option<ClientError>) {
        for action in actions {
            match action {
                ChannelAction::Connect => {
                    self.attempt += 1;
                    self.connection = Some(spawn_connection(
                        self.url.clone(),
                        self.attempt,
                        self.signals.clone(),
                    ));
                }
                ChannelAction::ScheduleRetry(delay) => {
                    if let Some((_, timer)) = self.pending_timer.take() {
                        timer.cancel();
                    }
                    self.next_timer += 1;
                    let wake = RetryWake {
                        signals: self.signals.clone(),
                        timer: self.next_timer,
                    };
                    debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                    self.pending_timer =
                        Some((self.next_timer, self.scheduler.schedule(delay, wake)));
                }
                ChannelAction::CancelRetry => {
                    if let Some((_, timer)) = self.pending_timer.take() {
                        timer.cancel();
                    }
                }
                ChannelAction::CloseConnection => {
                    if let Some(connection) = self.connection.take() {
                        connection.close().await;
                    }
                }
            }
        }
        self.publish(error).await;
    }

    async fn publish(&mut self, error: Option<ClientError>) {
        let state = self.machine.state();
        if self.published == Some(state) {
            return;
        }
        self.published = Some(state);
        self.state.send_replace(state);
        self.sink.channel_state_changed(state, error).await;
    }
}

fn spawn_connection(
    url: Url,
    attempt: u64,
    signals: mpsc::UnboundedSender<Signal>,
) -> ConnectionTask {
    let (close_tx, close_rx) = oneshot::channel();
    let task = tokio::spawn(run_connection(url, attempt, signals, close_rx));
    ConnectionTask {
        close: Some(close_tx),
        task,
    }
}

async fn run_connection(
    url: Url,
    attempt: u64,
    signals: mpsc::UnboundedSender<Signal>,
    mut close: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut close => return,
        connected = connect_async(url.as_str()) => connected,
    };
    let ws = match connected {
        Ok((ws, _)) => ws,
        Err(err) => {
            let _ = signals.send(Signal::Closed {
                attempt,
                error: ClientError::from(err),
            });
            return;
        }
    };
    if signals.send(Signal::Opened { attempt }).is_err() {
        return;
    }

    let (mut writer, mut reader) = ws.split();
    let error = loop {
        tokio::select! {
            _ = &mut close => {
                let _ = writer.close().await;
                return;
            }
            msg = reader.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if signals.send(Signal::Frame { attempt, text }).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| format!("{} {}", u16::from(frame.code), frame.reason))
                        .unwrap_or_else(|| "server closed the connection".to_string());
                    break ClientError::ChannelClosed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break ClientError::ChannelClosed(err.to_string()),
                None => break ClientError::ChannelClosed("connection ended".to_string()),
            },
        }
    };
    let _ = signals.send(Signal::Closed { attempt, error });
}

#[cfg(test)]
#[path = "tests/live_tests.rs"]
mod tests;
