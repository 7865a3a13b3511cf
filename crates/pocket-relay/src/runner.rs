//! Relay orchestration: transcripts up, replies down.
//!
//! Each pass works through the editor windows one at a time. A failure in
//! one window or one upload is logged and the pass moves on; only a rejected
//! API token changes behaviour, by switching outgoing polling off for the
//! rest of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use pocket_cdp::inject::preview;

use crate::bridge::EditorBridge;
use crate::client::BackendClient;
use crate::error::RelayError;

/// Periodic relay between the editor and the backend.
pub struct Relay<B> {
    bridge: B,
    backend: BackendClient,
    poll_interval: Duration,
    outgoing_disabled: AtomicBool,
}

impl<B: EditorBridge> Relay<B> {
    pub fn new(bridge: B, backend: BackendClient, poll_interval: Duration) -> Self {
        Self {
            bridge,
            backend,
            poll_interval,
            outgoing_disabled: AtomicBool::new(false),
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Whether a rejected token has switched outgoing polling off.
    pub fn outgoing_disabled(&self) -> bool {
        self.outgoing_disabled.load(Ordering::SeqCst)
    }

    /// Upload the transcript of every editor window. Returns how many landed.
    pub async fn sync_transcripts(&self) -> usize {
        let targets = self.bridge.discover().await;
        if targets.is_empty() {
            debug!("no editor windows to sync");
            return 0;
        }

        let transcripts = self.bridge.read_transcripts(&targets).await;
        if transcripts.is_empty() {
            debug!(windows = targets.len(), "no chat transcripts found");
            return 0;
        }

        let mut delivered = 0;
        for transcript in &transcripts {
            match self.backend.post_chat_update(transcript).await {
                Ok(()) => delivered += 1,
                Err(e @ RelayError::Unauthorized { .. }) => {
                    error!(name = %transcript.name, window = %transcript.id, error = %e, "chat update rejected")
                }
                Err(e) => {
                    warn!(name = %transcript.name, window = %transcript.id, error = %e, "failed to send chat update")
                }
            }
        }
        info!(delivered, total = transcripts.len(), "chat transcripts synced");
        delivered
    }

    /// Type any pending backend messages into their windows.
    ///
    /// Returns how many messages were submitted.
    pub async fn deliver_outgoing(&self) -> usize {
        if self.outgoing_disabled() {
            return 0;
        }

        let targets = self.bridge.discover().await;
        let mut submitted = 0;
        for target in &targets {
            let text = match self.backend.poll_outgoing(&target.url).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e @ RelayError::Unauthorized { .. }) => {
                    error!(window = %target.url, error = %e, "outgoing poll rejected; disabling outgoing polling");
                    self.outgoing_disabled.store(true, Ordering::SeqCst);
                    return submitted;
                }
                Err(e) => {
                    warn!(window = %target.url, error = %e, "failed to poll outgoing messages");
                    continue;
                }
            };

            info!(title = %target.title, message = %preview(&text), "received outgoing message");
            match self.bridge.send_text(target, &text).await {
                Ok(()) => submitted += 1,
                Err(e) => warn!(window = %target.url, error = %e, "failed to deliver outgoing message"),
            }
        }
        submitted
    }

    /// Run sync and delivery passes until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.backend.has_token() {
            warn!("not signed in; run `pocket-agent sign-in` before starting the relay");
            return;
        }

        info!(
            backend = %self.backend.base_url(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "relay started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_transcripts().await;
                    self.deliver_outgoing().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pocket_cdp::{CdpError, ChatTranscript, Target};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct FakeBridge {
        targets: Vec<Target>,
        transcripts: Vec<ChatTranscript>,
        failing_windows: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
        discoveries: Mutex<usize>,
    }

    impl FakeBridge {
        fn with_windows(ids: &[&str]) -> Self {
            Self {
                targets: ids
                    .iter()
                    .map(|id| Target {
                        url: id.to_string(),
                        title: format!("repo — {id}"),
                    })
                    .collect(),
                transcripts: ids
                    .iter()
                    .map(|id| ChatTranscript {
                        html: format!("<div>{id}</div>"),
                        name: id.to_string(),
                        id: id.to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EditorBridge for FakeBridge {
        async fn discover(&self) -> Vec<Target> {
            *self.discoveries.lock().unwrap() += 1;
            self.targets.clone()
        }

        async fn read_transcripts(&self, _targets: &[Target]) -> Vec<ChatTranscript> {
            self.transcripts.clone()
        }

        async fn send_text(&self, target: &Target, text: &str) -> Result<(), RelayError> {
            if self.failing_windows.contains(&target.url) {
                return Err(CdpError::InputNotFound { tried: 7 }.into());
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.url.clone(), text.to_string()));
            Ok(())
        }
    }

    fn relay(bridge: FakeBridge, server: &MockServer) -> Relay<FakeBridge> {
        let backend = BackendClient::new(&server.uri(), Some("tok".into())).unwrap();
        Relay::new(bridge, backend, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn sync_continues_past_failed_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/update"))
            .and(body_partial_json(serde_json::json!({ "windowId": "w2" })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/update"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let relay = relay(FakeBridge::with_windows(&["w1", "w2", "w3"]), &server);
        assert_eq!(relay.sync_transcripts().await, 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sync_without_windows_sends_nothing() {
        let server = MockServer::start().await;
        let relay = relay(FakeBridge::default(), &server);
        assert_eq!(relay.sync_transcripts().await, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outgoing_message_goes_to_its_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/commands/poll-outgoing/w1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/commands/poll-outgoing/w2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "add tests" })),
            )
            .mount(&server)
            .await;

        let relay = relay(FakeBridge::with_windows(&["w1", "w2"]), &server);
        assert_eq!(relay.deliver_outgoing().await, 1);
        assert_eq!(
            relay.bridge().sent(),
            vec![("w2".to_string(), "add tests".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_injection_does_not_stop_the_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "go" })),
            )
            .mount(&server)
            .await;

        let mut bridge = FakeBridge::with_windows(&["w1", "w2"]);
        bridge.failing_windows = vec!["w1".to_string()];
        let relay = relay(bridge, &server);

        assert_eq!(relay.deliver_outgoing().await, 1);
        assert_eq!(relay.bridge().sent(), vec![("w2".to_string(), "go".to_string())]);
    }

    #[tokio::test]
    async fn rejected_token_disables_outgoing_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/commands/poll-outgoing/w1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/commands/poll-outgoing/w2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let relay = relay(FakeBridge::with_windows(&["w1", "w2"]), &server);
        assert_eq!(relay.deliver_outgoing().await, 0);
        assert!(relay.outgoing_disabled());

        assert_eq!(relay.deliver_outgoing().await, 0);
        assert_eq!(*relay.bridge().discoveries.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn run_without_token_returns_immediately() {
        let server = MockServer::start().await;
        let backend = BackendClient::new(&server.uri(), None).unwrap();
        let relay = Relay::new(FakeBridge::with_windows(&["w1"]), backend, Duration::from_millis(5));

        let (_tx, rx) = watch::channel(false);
        relay.run(rx).await;
        assert_eq!(*relay.bridge().discoveries.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn run_ticks_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let relay = relay(FakeBridge::with_windows(&["w1"]), &server);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            relay.run(rx).await;
            relay
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let relay = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("relay should stop after shutdown")
            .unwrap();

        // Each tick discovers once for sync and once for delivery.
        assert!(*relay.bridge().discoveries.lock().unwrap() >= 2);
    }
}
