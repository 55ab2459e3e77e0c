//! Scripted inference backends for tests.

use super::{Embedder, InferenceBackend};
use crate::error::InferenceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

enum Script {
    Reply(String),
    Fail,
    Panic,
}

/// A backend that returns a canned reply (or fails) and records every
/// prompt it is given.
pub struct ScriptedBackend {
    name: String,
    script: Script,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedBackend {
    pub fn replying(name: &str, reply: &str) -> Self {
        Self::with_script(name, Script::Reply(reply.to_string()))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_script(name, Script::Fail)
    }

    pub fn panicking(name: &str) -> Self {
        Self::with_script(name, Script::Panic)
    }

    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Block every call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(ref gate) = self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        match self.script {
            Script::Reply(ref text) => Ok(text.clone()),
            Script::Fail => Err(InferenceError::Api {
                status: 503,
                body: format!("{} unavailable", self.name),
            }),
            Script::Panic => panic!("{} exploded", self.name),
        }
    }
}

/// An embedder that always returns the same vector.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
        Ok(self.0.clone())
    }
}

/// An embedder that is always down.
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Connect("http://localhost:11434".to_string()))
    }
}
