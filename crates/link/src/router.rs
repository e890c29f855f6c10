//! Inbound message router: decodes frames, records activity, and hands
//! addressed commands to the [`CommandExecutor`].

use std::sync::Arc;

use tl_protocol::{decode, resolve_key_code, DeviceIdentity, InboundMessage, KeyCode, OutboundMessage};

use crate::executor::CommandExecutor;
use crate::health::Heartbeat;

/// Classifies inbound frames and dispatches commands.
///
/// The router never touches the transport: a reply, if any, is returned
/// to the manager, which sends it only while the link is open.
#[derive(Clone)]
pub struct MessageRouter {
    identity: Arc<DeviceIdentity>,
    executor: Arc<dyn CommandExecutor>,
    max_inbound_bytes: usize,
}

impl MessageRouter {
    pub fn new(
        identity: Arc<DeviceIdentity>,
        executor: Arc<dyn CommandExecutor>,
        max_inbound_bytes: usize,
    ) -> Self {
        Self {
            identity,
            executor,
            max_inbound_bytes,
        }
    }

    /// Decode `raw` and dispatch it.  Undecodable frames are dropped
    /// without touching `heartbeat`.
    pub fn handle(&self, raw: &[u8], heartbeat: &mut Heartbeat) -> Option<OutboundMessage> {
        let msg = match decode(raw, self.max_inbound_bytes) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound message");
                return None;
            }
        };
        heartbeat.touch();
        self.dispatch(msg)
    }

    /// Apply the dispatch rules to a decoded message.
    pub fn dispatch(&self, msg: InboundMessage) -> Option<OutboundMessage> {
        match msg {
            InboundMessage::Welcome { text } => {
                tracing::info!(message = %text, "server welcome");
                None
            }
            InboundMessage::Pong => {
                tracing::trace!("received pong");
                None
            }
            InboundMessage::CommandRequest { target, command }
                if self.identity.is_addressed_by(&target) =>
            {
                let code = resolve_key_code(&command);
                tracing::info!(
                    target = %target,
                    command = %command,
                    code = %code,
                    "executing command"
                );
                self.spawn_execution(code);
                // Confirmed without waiting on the executor.
                Some(OutboundMessage::confirm_ok(&self.identity.id, command))
            }
            InboundMessage::CommandRequest { target, command } => {
                tracing::debug!(
                    target = %target,
                    command = %command,
                    device_id = %self.identity.id,
                    "command not addressed to this device, dropping"
                );
                None
            }
            InboundMessage::Unrecognized { raw } => {
                tracing::debug!(raw = %raw, "ignoring unrecognized message");
                None
            }
        }
    }

    fn spawn_execution(&self, code: KeyCode) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.execute(code.clone()).await {
                tracing::warn!(code = %code, error = %e, "command execution failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::types::ExecError;

    struct ChannelExecutor(mpsc::UnboundedSender<KeyCode>);

    #[async_trait::async_trait]
    impl CommandExecutor for ChannelExecutor {
        async fn execute(&self, code: KeyCode) -> Result<(), ExecError> {
            let _ = self.0.send(code);
            Ok(())
        }
    }

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl CommandExecutor for FailingExecutor {
        async fn execute(&self, _code: KeyCode) -> Result<(), ExecError> {
            Err(ExecError::Failed("device busy".into()))
        }
    }

    fn identity() -> Arc<DeviceIdentity> {
        Arc::new(DeviceIdentity {
            id: "TV-ABCD1234".into(),
            model: "M".into(),
            brand: "B".into(),
            ip: "10.0.0.2".into(),
            group_id: "G".into(),
        })
    }

    fn router() -> (MessageRouter, mpsc::UnboundedReceiver<KeyCode>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = MessageRouter::new(identity(), Arc::new(ChannelExecutor(tx)), 1024);
        (router, rx)
    }

    fn heartbeat() -> Heartbeat {
        Heartbeat::new(Duration::from_secs(30), 2, 3)
    }

    #[tokio::test]
    async fn broadcast_sleep_executes_223_and_confirms() {
        let (router, mut rx) = router();
        let mut hb = heartbeat();

        let reply = router.handle(br#"{"target":"all","command":"sleep"}"#, &mut hb);

        match reply {
            Some(OutboundMessage::Confirm {
                tv_id,
                command,
                status,
                ..
            }) => {
                assert_eq!(tv_id, "TV-ABCD1234");
                assert_eq!(command, "sleep");
                assert_eq!(status, "ok");
            }
            other => panic!("expected Confirm, got {other:?}"),
        }
        assert_eq!(rx.recv().await, Some(KeyCode::Code(223)));
    }

    #[tokio::test]
    async fn own_id_with_unknown_command_passes_raw() {
        let (router, mut rx) = router();
        let reply = router.dispatch(InboundMessage::CommandRequest {
            target: "TV-ABCD1234".into(),
            command: "open_youtube".into(),
        });
        assert!(matches!(reply, Some(OutboundMessage::Confirm { .. })));
        assert_eq!(rx.recv().await, Some(KeyCode::Raw("open_youtube".into())));
    }

    #[tokio::test]
    async fn other_target_is_dropped() {
        let (router, mut rx) = router();
        let reply = router.dispatch(InboundMessage::CommandRequest {
            target: "TV-FFFF0000".into(),
            command: "power".into(),
        });
        assert!(reply.is_none());
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn confirm_sent_even_when_execution_fails() {
        let router = MessageRouter::new(identity(), Arc::new(FailingExecutor), 1024);
        let reply = router.dispatch(InboundMessage::CommandRequest {
            target: "all".into(),
            command: "power".into(),
        });
        assert!(matches!(
            reply,
            Some(OutboundMessage::Confirm { ref status, .. }) if status == "ok"
        ));
    }

    #[tokio::test]
    async fn welcome_and_pong_produce_no_reply() {
        let (router, _rx) = router();
        let mut hb = heartbeat();
        assert!(router.handle(br#"{"type":"welcome","message":"hi"}"#, &mut hb).is_none());
        assert!(router.handle(br#"{"type":"pong"}"#, &mut hb).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_input_does_not_touch_activity() {
        let (router, _rx) = router();
        let mut hb = heartbeat();
        let before = hb.last_activity();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(router.handle(b"{oops", &mut hb).is_none());
        assert_eq!(hb.last_activity(), before);

        assert!(router.handle(br#"{"type":"pong"}"#, &mut hb).is_none());
        assert!(hb.last_activity() > before);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_input_dropped_without_activity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = MessageRouter::new(identity(), Arc::new(ChannelExecutor(tx)), 8);
        let mut hb = heartbeat();
        let before = hb.last_activity();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(router.handle(br#"{"type":"pong"}"#, &mut hb).is_none());
        assert_eq!(hb.last_activity(), before);
    }
}
