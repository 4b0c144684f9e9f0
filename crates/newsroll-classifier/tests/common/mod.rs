//! Test doubles for the completion service and backoff timer

#![allow(dead_code)]

use async_trait::async_trait;
use newsroll_classifier::{CompletionClient, CompletionError, CompletionRequest, Sleeper};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replays scripted responses in order and records every request
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_string())))
    }
}

/// Puts every valid id into a single group, reading the count from the prompt
pub struct AllInOneClient;

#[async_trait]
impl CompletionClient for AllInOneClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let prompt = &request.messages[0].content;
        let count: u32 = prompt
            .split("There are ")
            .nth(1)
            .and_then(|rest| rest.split(' ').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok(response(&[("everything", (1..=count).collect())]))
    }
}

/// Never answers
pub struct HangingClient;

#[async_trait]
impl CompletionClient for HangingClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Records requested waits without sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Raw response text with the given `(label, dense ids)` groups
pub fn response(groups: &[(&str, Vec<u32>)]) -> String {
    let groups: Vec<_> = groups
        .iter()
        .map(|(label, ids)| {
            json!({
                "label": label,
                "summary": format!("About {}", label),
                "item_ids": ids,
            })
        })
        .collect();
    json!({ "groups": groups }).to_string()
}
