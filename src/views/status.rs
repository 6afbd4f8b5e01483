use crate::controller::ChatController;
use crate::session::{LifecycleStatus, SessionState};
use dioxus::prelude::*;

fn status_class(status: LifecycleStatus) -> &'static str {
    match status {
        LifecycleStatus::Offline => "offline",
        LifecycleStatus::Starting => "starting",
        LifecycleStatus::Online => "online",
        LifecycleStatus::Error => "error",
    }
}

#[component]
pub fn StatusBar(state: Signal<SessionState>) -> Element {
    let controller = use_context::<ChatController>();
    let status = state.read().status;
    let pending = state.read().pending_turn;
    let start_label = if matches!(status, LifecycleStatus::Error) {
        "Retry"
    } else {
        "Start model"
    };

    rsx! {
        div { class: "status-bar",
            span { class: format_args!("status-dot {}", status_class(status)) }
            span { class: "status-label", "{status.label()}" }
            button {
                class: "btn btn-primary",
                r#type: "button",
                disabled: !status.can_start(),
                onclick: {
                    let controller = controller.clone();
                    move |_| {
                        controller.request_start();
                    }
                },
                "{start_label}"
            }
            button {
                class: "btn",
                r#type: "button",
                title: "Forget earlier messages when asking the model",
                disabled: pending,
                onclick: move |_| {
                    if let Err(reason) = controller.reset_context() {
                        tracing::debug!(?reason, "context reset ignored");
                    }
                },
                "New topic"
            }
        }
    }
}
