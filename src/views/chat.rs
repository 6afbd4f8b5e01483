use crate::controller::{ChatController, SendOutcome};
use crate::session::SessionState;
use crate::types::{ChatMessage, Role};
use dioxus::events::Key;
use dioxus::prelude::*;
use std::time::Duration;

/// Gives the webview a frame to lay out new messages before scrolling.
const SCROLL_DELAY: Duration = Duration::from_millis(50);
const SCROLL_TO_BOTTOM_JS: &str = r#"
const list = document.getElementById('chat-list');
if (list) { list.scrollTop = list.scrollHeight; }
"#;

fn bubble_class(msg: &ChatMessage) -> &'static str {
    match msg.role() {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System if msg.is_error() => "system error",
        Role::System => "system",
    }
}

/// Hands the composer text to the controller and clears it once accepted.
fn submit(controller: &ChatController, mut input: Signal<String>) {
    let text = input();
    match controller.send_turn(&text) {
        SendOutcome::Accepted(_) => input.set(String::new()),
        SendOutcome::Rejected(reason) => tracing::debug!(?reason, "composer send ignored"),
    }
}

#[component]
pub fn ChatView(state: Signal<SessionState>) -> Element {
    let controller = use_context::<ChatController>();
    let mut input = use_signal(String::new);

    use_effect(move || {
        let _len = state.read().conversation.len();
        spawn(async move {
            tokio::time::sleep(SCROLL_DELAY).await;
            let _ = document::eval(SCROLL_TO_BOTTOM_JS);
        });
    });

    let snapshot = state();
    let messages = snapshot.messages();
    let online = snapshot.status.can_send();
    let can_send = snapshot.can_send();
    let placeholder = if online {
        "Ask ZarSage about your crops…"
    } else {
        "Start the model to begin."
    };

    let on_enter = {
        let controller = controller.clone();
        move |ev: KeyboardEvent| {
            if ev.key() == Key::Enter && !ev.modifiers().shift() {
                ev.prevent_default();
                submit(&controller, input);
            }
        }
    };
    let on_send = {
        let controller = controller.clone();
        move |_| submit(&controller, input)
    };
    let on_stop = move |_| {
        controller.cancel_turn();
    };

    rsx! {
        div { id: "chat-list", class: "chat-list",
            for (i, msg) in messages.iter().enumerate() {
                div { key: "{i}", class: format_args!("message-row {}", bubble_class(msg)),
                    div { class: format_args!("bubble {}", bubble_class(msg)), "{msg.content()}" }
                    if let Some(ts) = msg.display_time() {
                        div { class: "message-meta",
                            span { class: "message-timestamp", "{ts}" }
                        }
                    }
                }
            }
            if snapshot.pending_turn {
                div { class: "message-row assistant",
                    span { class: "shimmer-text", "Thinking…" }
                }
            }
        }

        form { class: "composer",
            onsubmit: move |ev| ev.prevent_default(),
            textarea {
                rows: "2",
                placeholder,
                value: "{input}",
                oninput: move |ev| input.set(ev.value()),
                onkeydown: on_enter,
                disabled: !online,
                autofocus: true,
            }
            if snapshot.pending_turn {
                button { class: "btn", r#type: "button", onclick: on_stop, "Stop" }
            } else {
                button {
                    class: "btn btn-primary",
                    r#type: "button",
                    disabled: !can_send || input().trim().is_empty(),
                    onclick: on_send,
                    "Send"
                }
            }
        }
    }
}
