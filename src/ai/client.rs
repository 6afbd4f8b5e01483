use super::ModelService;
use super::openai::{CompletionRequest, WireMessage, parse_completion};
use super::sidecar::{Sidecar, find_available_port, is_port_available, render_args};
use crate::config::ModelConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::Role;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const READINESS_POLL: Duration = Duration::from_millis(250);
const LOCALHOST: &str = "127.0.0.1";

/// Model service backed by a local OpenAI-compatible server.
///
/// Unless an external endpoint is configured, the server is launched as a
/// child process on the first `start`. The prompt history sent to the model
/// is kept here, seeded with the configured preamble.
pub struct LocalModelClient {
    config: ModelConfig,
    http: Client,
    sidecar: Arc<tokio::sync::Mutex<Option<Sidecar>>>,
    base_url: Mutex<String>,
    history: Mutex<Vec<WireMessage>>,
}

impl LocalModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| local_base_url(config.port));
        Self {
            config,
            http: Client::new(),
            sidecar: Arc::new(tokio::sync::Mutex::new(None)),
            base_url: Mutex::new(base_url),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn base_url(&self) -> String {
        lock(&self.base_url).clone()
    }

    /// Number of messages the next request would carry before the new prompt.
    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    /// Makes sure a sidecar process is running and returns its port.
    async fn ensure_sidecar(&self) -> ChatResult<u16> {
        let mut slot = self.sidecar.lock().await;
        if let Some(sidecar) = slot.as_mut() {
            match sidecar.exit_status()? {
                None => {
                    tracing::debug!(port = sidecar.port(), "model server already running");
                    return Ok(sidecar.port());
                }
                Some(status) => {
                    tracing::warn!(%status, "model server exited, restarting");
                    *slot = None;
                }
            }
        }

        let mut port = self.config.port;
        if !is_port_available(port) {
            port = find_available_port(port.saturating_add(1));
            tracing::info!(preferred = self.config.port, port, "preferred port busy");
        }

        let args = render_args(&self.config.sidecar_args, port);
        let sidecar = Sidecar::spawn(&self.config.sidecar_program, &args, port)?;
        *lock(&self.base_url) = local_base_url(port);
        *slot = Some(sidecar);
        Ok(port)
    }

    /// Polls the server until it answers any HTTP request.
    async fn wait_until_ready(&self) -> ChatResult<()> {
        let url = format!("{}/models", self.base_url());
        loop {
            if let Some(sidecar) = self.sidecar.lock().await.as_mut()
                && let Some(status) = sidecar.exit_status()?
            {
                return Err(ChatError::startup(format!(
                    "model server exited during startup ({status})"
                )));
            }

            match self.http.get(&url).send().await {
                Ok(response) => {
                    tracing::info!(%url, status = %response.status(), "model server ready");
                    return Ok(());
                }
                Err(err) if self.config.endpoint.is_some() && !err.is_connect() => {
                    return Err(ChatError::startup(err.to_string()));
                }
                Err(err) => {
                    tracing::trace!(%url, error = %err, "model server not ready yet");
                }
            }
            tokio::time::sleep(READINESS_POLL).await;
        }
    }

    /// History plus the new prompt, preamble first.
    fn build_request_messages(&self, prompt: &str) -> Vec<WireMessage> {
        let history = lock(&self.history);
        let mut messages = Vec::with_capacity(history.len() + 2);
        if history.is_empty() {
            messages.push(WireMessage::new(Role::System, self.config.preamble.clone()));
        }
        messages.extend(history.iter().cloned());
        messages.push(WireMessage::new(Role::User, prompt));
        trim_history(&mut messages, self.config.max_history);
        messages
    }

    fn commit_exchange(&self, mut sent: Vec<WireMessage>, reply: &str) {
        sent.push(WireMessage::new(Role::Assistant, reply));
        trim_history(&mut sent, self.config.max_history);
        *lock(&self.history) = sent;
    }
}

#[async_trait]
impl ModelService for LocalModelClient {
    async fn start(&self) -> ChatResult<()> {
        if self.config.endpoint.is_none() {
            self.ensure_sidecar().await?;
        }
        self.wait_until_ready().await
    }

    async fn complete(&self, prompt: &str) -> ChatResult<String> {
        let messages = self.build_request_messages(prompt);
        let url = format!("{}/chat/completions", self.base_url());

        let response = self
            .http
            .post(&url)
            .json(&CompletionRequest {
                model: &self.config.model,
                messages: &messages,
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let reply = parse_completion(&body)?;
        self.commit_exchange(messages, &reply);
        Ok(reply)
    }

    async fn shutdown(&self) -> ChatResult<()> {
        self.reset_context();
        if let Some(mut sidecar) = self.sidecar.lock().await.take() {
            sidecar.kill().await?;
        }
        Ok(())
    }

    fn terminate(&self) {
        self.reset_context();
        if let Ok(mut slot) = self.sidecar.try_lock() {
            if let Some(sidecar) = slot.as_mut()
                && let Err(err) = sidecar.start_kill()
            {
                tracing::warn!(error = %err, "failed to kill model server");
            }
            return;
        }

        // A start holds the slot. Kill once it lets go.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!("model server slot busy, deferring kill");
                let slot = Arc::clone(&self.sidecar);
                runtime.spawn(async move {
                    if let Some(mut sidecar) = slot.lock().await.take()
                        && let Err(err) = sidecar.kill().await
                    {
                        tracing::warn!(error = %err, "failed to kill model server");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("model server slot busy and no runtime, relying on kill_on_drop");
            }
        }
    }

    fn reset_context(&self) {
        let mut history = lock(&self.history);
        tracing::debug!(dropped = history.len(), "prompt history cleared");
        history.clear();
    }
}

fn local_base_url(port: u16) -> String {
    format!("http://{LOCALHOST}:{port}/v1")
}

/// Keeps at most `max` messages, dropping the oldest after a leading system
/// preamble. The preamble and the newest message are always kept, even when
/// that exceeds `max`.
fn trim_history(history: &mut Vec<WireMessage>, max: usize) {
    if history.len() <= max {
        return;
    }
    let keep_from = usize::from(matches!(history.first(), Some(m) if m.role == Role::System));
    let removable = history.len().saturating_sub(keep_from + 1);
    let drop = (history.len() - max).min(removable);
    history.drain(keep_from..keep_from + drop);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
