use crate::controller::ChatController;
use crate::session::SessionState;
use crate::views::{ChatView, StatusBar};
use dioxus::prelude::*;

const APP_CSS: &str = r#"
:root {
    --color-bg-primary: #0f1a12;
    --color-text-primary: #f1f5ef;
    --color-text-muted: #a9b8a6;
    --color-border: #2f4a34;
    --color-chat-user-bg: #e7f2e2;
    --color-chat-user-text: #0f1a12;
    --color-chat-assistant-bg: #17261a;
    --color-error: #ff6b57;
    --color-accent: #7fc46a;
}
body { margin: 0; font-family: system-ui, sans-serif; background: var(--color-bg-primary); color: var(--color-text-primary); }
.main-container { display: flex; flex-direction: column; height: 100vh; }
.status-bar { display: flex; align-items: center; gap: 0.5rem; padding: 0.75rem 1rem; border-bottom: 1px solid var(--color-border); }
.status-dot { width: 0.6rem; height: 0.6rem; border-radius: 50%; background: var(--color-text-muted); }
.status-dot.starting { background: #e0c25a; }
.status-dot.online { background: var(--color-accent); }
.status-dot.error { background: var(--color-error); }
.status-label { flex: 1; color: var(--color-text-muted); }
.chat-list { flex: 1; overflow-y: auto; padding: 1rem; }
.message-row { display: flex; flex-direction: column; margin-bottom: 0.75rem; }
.message-row.user { align-items: flex-end; }
.bubble { max-width: 75%; padding: 0.6rem 0.8rem; border-radius: 0.6rem; white-space: pre-wrap; }
.bubble.user { background: var(--color-chat-user-bg); color: var(--color-chat-user-text); }
.bubble.assistant { background: var(--color-chat-assistant-bg); }
.bubble.system { color: var(--color-text-muted); font-style: italic; }
.bubble.error { color: var(--color-error); border: 1px solid var(--color-error); }
.message-timestamp { font-size: 0.75rem; color: var(--color-text-muted); }
.shimmer-text { color: var(--color-text-muted); font-style: italic; }
.composer { display: flex; gap: 0.5rem; padding: 0.75rem 1rem; border-top: 1px solid var(--color-border); }
.composer textarea { flex: 1; resize: none; background: transparent; color: inherit; border: 1px solid var(--color-border); border-radius: 0.4rem; padding: 0.5rem; }
.btn { background: transparent; color: inherit; border: 1px solid var(--color-border); border-radius: 0.4rem; padding: 0.4rem 0.9rem; cursor: pointer; }
.btn:disabled { opacity: 0.4; cursor: default; }
.btn-primary { border-color: var(--color-accent); }
"#;

/// Root component. Mirrors the session into a signal and tears the model
/// process down when the window goes away.
#[component]
pub fn App() -> Element {
    let controller = use_context::<ChatController>();
    let state = use_signal(|| controller.session().snapshot());

    use_session_mirror(&controller, state);
    use_drop({
        let controller = controller.clone();
        move || controller.terminate()
    });

    rsx! {
        style { dangerous_inner_html: "{APP_CSS}" }
        div { class: "main-container",
            StatusBar { state }
            ChatView { state }
        }
    }
}

fn use_session_mirror(controller: &ChatController, state: Signal<SessionState>) {
    let session = controller.session().clone();
    use_future(move || {
        let mut updates = session.subscribe();
        let mut state = state;
        async move {
            while updates.changed().await.is_ok() {
                let latest = updates.borrow_and_update().clone();
                state.set(latest);
            }
        }
    });
}
