//! Integration tests for the chat controller
//!
//! Drives `ChatController` against a scripted model service and checks the
//! session state a presentation layer would observe.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use zarsage::ai::ModelService;
use zarsage::{
    ChatController, ChatError, ChatMessage, ChatResult, LifecycleStatus, Rejection, Role,
    Session, Timeouts,
};

enum Reply<T> {
    Ready(ChatResult<T>),
    Deferred(oneshot::Receiver<ChatResult<T>>),
    Hang,
    Panic,
}

async fn resolve<T>(reply: Reply<T>) -> ChatResult<T> {
    match reply {
        Reply::Ready(result) => result,
        Reply::Deferred(rx) => rx.await.unwrap_or(Err(ChatError::Cancelled)),
        Reply::Hang => futures::future::pending().await,
        Reply::Panic => panic!("model service crashed"),
    }
}

/// Model service whose replies are queued up front by each test.
#[derive(Default)]
struct ScriptedModel {
    starts: Mutex<VecDeque<Reply<()>>>,
    completions: Mutex<VecDeque<Reply<String>>>,
    prompts: Mutex<Vec<String>>,
    start_calls: AtomicUsize,
    shutdowns: AtomicUsize,
    resets: AtomicUsize,
}

impl ScriptedModel {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn on_start(&self, reply: Reply<()>) {
        self.starts.lock().unwrap().push_back(reply);
    }

    fn on_complete(&self, reply: Reply<String>) {
        self.completions.lock().unwrap().push_back(reply);
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn start(&self) -> ChatResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Ready(Ok(())));
        resolve(reply).await
    }

    async fn complete(&self, prompt: &str) -> ChatResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Ready(Err(ChatError::Backend {
                status: 500,
                body: "no reply scripted".into(),
            })));
        resolve(reply).await
    }

    async fn shutdown(&self) -> ChatResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset_context(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

const GREETING: &str = "Hello! I'm ZarSage.";

fn controller_with(model: &Arc<ScriptedModel>, timeouts: Timeouts) -> ChatController {
    let session = Arc::new(Session::new(GREETING));
    let service: Arc<dyn ModelService> = model.clone();
    ChatController::new(session, service, timeouts)
}

fn default_timeouts() -> Timeouts {
    Timeouts {
        start: Duration::from_secs(30),
        completion: Duration::from_secs(30),
    }
}

async fn online_controller(model: &Arc<ScriptedModel>, timeouts: Timeouts) -> ChatController {
    let controller = controller_with(model, timeouts);
    let status = controller.request_start().await.expect("start task");
    assert_eq!(status, LifecycleStatus::Online);
    controller
}

fn last_message(controller: &ChatController) -> ChatMessage {
    controller
        .session()
        .messages()
        .last()
        .cloned()
        .expect("conversation is never empty")
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_session_starts_offline_with_greeting() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());

        let state = controller.session().snapshot();
        assert_eq!(state.status, LifecycleStatus::Offline);
        assert!(!state.pending_turn);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].role(), Role::Assistant);
        assert_eq!(state.messages()[0].content(), GREETING);
    }

    #[tokio::test]
    async fn test_start_failure_reports_detail() {
        let model = ScriptedModel::new();
        let (tx, rx) = oneshot::channel();
        model.on_start(Reply::Deferred(rx));
        let controller = controller_with(&model, default_timeouts());

        let handle = controller.request_start();
        assert_eq!(controller.session().status(), LifecycleStatus::Starting);

        tx.send(Err(ChatError::startup("connection refused"))).unwrap();
        assert_eq!(handle.await.unwrap(), LifecycleStatus::Error);
        assert_eq!(controller.session().status(), LifecycleStatus::Error);

        let report = last_message(&controller);
        assert_eq!(report.role(), Role::System);
        assert!(report.is_error());
        assert!(report.content().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_start_success_goes_online() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());

        assert_eq!(controller.request_start().await.unwrap(), LifecycleStatus::Online);
        assert_eq!(controller.session().status(), LifecycleStatus::Online);
        assert_eq!(controller.session().messages().len(), 1);
        assert_eq!(model.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_recoverable_by_restarting() {
        let model = ScriptedModel::new();
        model.on_start(Reply::Ready(Err(ChatError::startup("out of memory"))));
        model.on_start(Reply::Ready(Ok(())));
        let controller = controller_with(&model, default_timeouts());

        assert_eq!(controller.request_start().await.unwrap(), LifecycleStatus::Error);
        let retry = controller.request_start();
        assert_eq!(controller.session().status(), LifecycleStatus::Starting);
        assert_eq!(retry.await.unwrap(), LifecycleStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_timeout_sets_error() {
        let model = ScriptedModel::new();
        model.on_start(Reply::Hang);
        let controller = controller_with(
            &model,
            Timeouts {
                start: Duration::from_secs(5),
                completion: Duration::from_secs(5),
            },
        );

        assert_eq!(controller.request_start().await.unwrap(), LifecycleStatus::Error);
        let report = last_message(&controller);
        assert!(report.is_error());
        assert!(report.content().contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_overlapping_starts_last_write_wins() {
        let model = ScriptedModel::new();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        model.on_start(Reply::Deferred(first_rx));
        model.on_start(Reply::Deferred(second_rx));
        let controller = controller_with(&model, default_timeouts());

        let first = controller.request_start();
        let second = controller.request_start();
        tokio::task::yield_now().await;

        first_tx.send(Ok(())).unwrap();
        assert_eq!(first.await.unwrap(), LifecycleStatus::Online);
        second_tx.send(Err(ChatError::startup("port in use"))).unwrap();
        assert_eq!(second.await.unwrap(), LifecycleStatus::Error);
        assert_eq!(controller.session().status(), LifecycleStatus::Error);
    }

    #[tokio::test]
    async fn test_status_changes_are_published() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());
        let mut updates = controller.session().subscribe();
        let _ = updates.borrow_and_update();

        let handle = controller.request_start();
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().status, LifecycleStatus::Starting);

        handle.await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().status, LifecycleStatus::Online);
    }
}

mod turn_tests {
    use super::*;

    #[tokio::test]
    async fn test_turn_appends_user_then_assistant() {
        let model = ScriptedModel::new();
        let (tx, rx) = oneshot::channel();
        model.on_complete(Reply::Deferred(rx));
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller
            .send_turn("Hello")
            .into_handle()
            .expect("turn accepted");

        let user = last_message(&controller);
        assert_eq!(user.role(), Role::User);
        assert_eq!(user.content(), "Hello");
        assert!(controller.session().is_pending());

        tx.send(Ok("Hi there".to_string())).unwrap();
        assert_eq!(handle.wait().await.unwrap(), "Hi there");

        let reply = last_message(&controller);
        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.content(), "Hi there");
        assert!(!reply.is_error());
        assert!(!controller.session().is_pending());
        assert_eq!(controller.session().messages().len(), 3);
    }

    #[tokio::test]
    async fn test_turn_failure_keeps_session_usable() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Ready(Err(ChatError::Backend {
            status: 500,
            body: "backend crashed".into(),
        })));
        model.on_complete(Reply::Ready(Ok("Recovered".into())));
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller.send_turn("Bad prompt").into_handle().unwrap();
        assert!(handle.wait().await.is_err());

        let report = last_message(&controller);
        assert_eq!(report.role(), Role::System);
        assert!(report.is_error());
        assert!(report.content().contains("backend crashed"));
        assert!(!controller.session().is_pending());
        assert_eq!(controller.session().status(), LifecycleStatus::Online);

        let next = controller.send_turn("Try again");
        assert!(next.is_accepted());
        assert_eq!(next.into_handle().unwrap().wait().await.unwrap(), "Recovered");
    }

    #[tokio::test]
    async fn test_only_first_send_accepted_while_pending() {
        let model = ScriptedModel::new();
        let (tx, rx) = oneshot::channel();
        model.on_complete(Reply::Deferred(rx));
        let controller = online_controller(&model, default_timeouts()).await;

        let first = controller.send_turn("first");
        assert!(first.is_accepted());
        for text in ["second", "third", "fourth"] {
            assert_eq!(
                controller.send_turn(text).rejection(),
                Some(Rejection::TurnInProgress)
            );
        }
        assert_eq!(controller.session().messages().len(), 2);

        tx.send(Ok("done".into())).unwrap();
        first.into_handle().unwrap().wait().await.unwrap();

        assert_eq!(model.prompts(), ["first"]);
        assert_eq!(controller.session().messages().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_input_never_reaches_model() {
        let model = ScriptedModel::new();
        let controller = online_controller(&model, default_timeouts()).await;

        for text in ["", "   ", "\n\t "] {
            assert_eq!(
                controller.send_turn(text).rejection(),
                Some(Rejection::EmptyInput)
            );
        }
        tokio::task::yield_now().await;

        assert_eq!(controller.session().messages().len(), 1);
        assert!(!controller.session().is_pending());
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_online() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());

        assert_eq!(
            controller.send_turn("Hello").rejection(),
            Some(Rejection::NotOnline)
        );

        let (_tx, rx) = oneshot::channel();
        model.on_start(Reply::Deferred(rx));
        let _start = controller.request_start();
        assert_eq!(
            controller.send_turn("Hello").rejection(),
            Some(Rejection::NotOnline)
        );

        assert_eq!(controller.session().messages().len(), 1);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_check_comes_first() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());
        assert_eq!(
            controller.send_turn("  ").rejection(),
            Some(Rejection::EmptyInput)
        );
    }

    #[tokio::test]
    async fn test_prompt_is_trimmed() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Ready(Ok("ok".into())));
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller.send_turn("  When do I plant maize?\n").into_handle().unwrap();
        assert_eq!(last_message(&controller).content(), "When do I plant maize?");
        handle.wait().await.unwrap();
        assert_eq!(model.prompts(), ["When do I plant maize?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_completion_times_out_and_releases_gate() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Hang);
        let controller = online_controller(
            &model,
            Timeouts {
                start: Duration::from_secs(5),
                completion: Duration::from_secs(5),
            },
        )
        .await;

        let handle = controller.send_turn("Are you there?").into_handle().unwrap();
        assert!(matches!(handle.wait().await, Err(ChatError::Timeout(_))));

        assert!(!controller.session().is_pending());
        let report = last_message(&controller);
        assert!(report.is_error());
        assert!(report.content().contains("timed out after 5s"));
        assert_eq!(controller.session().status(), LifecycleStatus::Online);
    }

    #[tokio::test]
    async fn test_cancel_turn_releases_gate() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Hang);
        let controller = online_controller(&model, default_timeouts()).await;

        assert!(!controller.cancel_turn());
        let handle = controller.send_turn("Long question").into_handle().unwrap();
        assert!(controller.cancel_turn());

        assert!(matches!(handle.wait().await, Err(ChatError::Cancelled)));
        assert!(!controller.session().is_pending());
        let report = last_message(&controller);
        assert!(report.is_error());
        assert!(report.content().contains("cancelled"));
        assert!(!controller.cancel_turn());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_turn() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Hang);
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller.send_turn("Still there?").into_handle().unwrap();
        controller.shutdown().await.unwrap();

        assert!(matches!(handle.wait().await, Err(ChatError::Cancelled)));
        assert!(!controller.session().is_pending());
        assert_eq!(model.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_crashed_turn_task_leaves_nothing_to_cancel() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Panic);
        model.on_complete(Reply::Ready(Ok("Back again".into())));
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller.send_turn("Crash please").into_handle().unwrap();
        assert!(matches!(handle.wait().await, Err(ChatError::Process(_))));

        assert!(!controller.session().is_pending());
        assert!(!controller.cancel_turn());
        assert_eq!(last_message(&controller).content(), "Crash please");

        let next = controller.send_turn("Again").into_handle().unwrap();
        assert_eq!(next.wait().await.unwrap(), "Back again");
    }
}

mod context_tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_context_keeps_visible_conversation() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Ready(Ok("Hi there".into())));
        let controller = online_controller(&model, default_timeouts()).await;
        controller.send_turn("Hello").into_handle().unwrap().wait().await.unwrap();

        assert_eq!(controller.reset_context(), Ok(()));
        assert_eq!(model.resets.load(Ordering::SeqCst), 1);

        let messages = controller.session().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].content(), "Hi there");
        let note = &messages[3];
        assert_eq!(note.role(), Role::System);
        assert!(!note.is_error());
    }

    #[tokio::test]
    async fn test_reset_context_refused_while_turn_pending() {
        let model = ScriptedModel::new();
        let (tx, rx) = oneshot::channel();
        model.on_complete(Reply::Deferred(rx));
        let controller = online_controller(&model, default_timeouts()).await;

        let handle = controller.send_turn("Hello").into_handle().unwrap();
        assert_eq!(controller.reset_context(), Err(Rejection::TurnInProgress));
        assert_eq!(model.resets.load(Ordering::SeqCst), 0);
        assert_eq!(controller.session().messages().len(), 2);

        tx.send(Ok("Hi there".into())).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(controller.reset_context(), Ok(()));
        assert_eq!(model.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_context_allowed_before_start() {
        let model = ScriptedModel::new();
        let controller = controller_with(&model, default_timeouts());

        assert_eq!(controller.reset_context(), Ok(()));
        assert_eq!(controller.session().status(), LifecycleStatus::Offline);
        assert_eq!(controller.session().messages().len(), 2);
    }
}

mod ordering_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_append_order_matches_call_order_for_readers() {
        let session = Arc::new(Session::new(GREETING));
        let expected: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();

        let mut updates = session.subscribe();
        let reader = tokio::spawn({
            let expected = expected.clone();
            async move {
                loop {
                    let snapshot = updates.borrow_and_update().messages();
                    let seen: Vec<String> = snapshot
                        .iter()
                        .skip(1)
                        .map(|m| m.content().to_string())
                        .collect();
                    assert_eq!(seen[..], expected[..seen.len()]);
                    if seen.len() == expected.len() {
                        break;
                    }
                    if updates.changed().await.is_err() {
                        break;
                    }
                }
            }
        });

        for (i, text) in expected.iter().enumerate() {
            assert_eq!(session.append(ChatMessage::user(text.clone())), i + 2);
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_held_snapshot_is_unaffected_by_later_turns() {
        let model = ScriptedModel::new();
        model.on_complete(Reply::Ready(Ok("Hi there".into())));
        let controller = online_controller(&model, default_timeouts()).await;

        let before = controller.session().messages();
        let handle = controller.send_turn("Hello").into_handle().unwrap();
        handle.wait().await.unwrap();

        assert_eq!(before.len(), 1);
        let after = controller.session().messages();
        let roles: Vec<Role> = after.iter().map(|m| m.role()).collect();
        assert_eq!(roles, [Role::Assistant, Role::User, Role::Assistant]);
    }
}
