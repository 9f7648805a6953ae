// tests/common/mod.rs
// Shared fixtures: scripted model providers and an in-memory service

#![allow(dead_code)]

use async_trait::async_trait;
use healthy::db::{IntakeStore, SqliteStore};
use healthy::llm::{CompletionRequest, LlmClient, ModelGateway, Provider, RetryPolicy};
use healthy::IntakeService;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Provider that answers from a script and records every request
pub struct ScriptedProvider {
    provider: Provider,
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, text: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn fail(&self, error: impl Into<String>) {
        self.script.lock().unwrap().push_back(Err(error.into()));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl LlmClient for ScriptedProvider {
    async fn send(&self, request: CompletionRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("503 script exhausted")),
        }
    }

    fn provider_type(&self) -> Provider {
        self.provider
    }
}

pub struct Harness {
    pub service: Arc<IntakeService>,
    pub store: Arc<dyn IntakeStore>,
    pub primary: Arc<ScriptedProvider>,
    pub secondary: Arc<ScriptedProvider>,
}

pub fn gateway(primary: &Arc<ScriptedProvider>, secondary: &Arc<ScriptedProvider>) -> ModelGateway {
    ModelGateway::new(
        Some(primary.clone() as Arc<dyn LlmClient>),
        Some(secondary.clone() as Arc<dyn LlmClient>),
    )
    .with_retry_policy(RetryPolicy::immediate(2))
}

pub async fn harness() -> Harness {
    harness_with(|service| service).await
}

/// Build a harness, letting the caller adjust the service (e.g. wire a queue)
pub async fn harness_with(adjust: impl FnOnce(IntakeService) -> IntakeService) -> Harness {
    let store: Arc<dyn IntakeStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let primary = ScriptedProvider::new(Provider::Gemini);
    let secondary = ScriptedProvider::new(Provider::DeepSeek);
    let service = IntakeService::new(store.clone(), Arc::new(gateway(&primary, &secondary)));

    Harness {
        service: Arc::new(adjust(service)),
        store,
        primary,
        secondary,
    }
}

/// Model output asking question `n`, with optional extra directive lines first
pub fn question(n: u32, directives: &str) -> String {
    format!(
        "{}当前问题编号：{}\n【给用户的回复】第{}题：您最近的睡眠质量如何？ A.很好 B.一般 C.较差",
        directives, n, n
    )
}

/// Opening model output: locks the track, plans `quota` questions, asks question 1
pub fn opening(quota: u32) -> String {
    question(
        1,
        &format!(
            "用户为中年女性，主诉失眠。\n锁定赛道：睡眠健康\n总问题数：{}\n用户信息：女 34岁 长期失眠\n",
            quota
        ),
    )
}

pub const REPORT_HTML: &str = r#"```html
<div class="report">
  <h1>睡眠健康评估</h1>
  <span class="score-value">82</span>
  <span class="risk-badge risk-high">高</span>
</div>
```"#;
