//! Test doubles shared by the integration tests
//!
//! A fake browser engine that needs no Chrome and a scripted oracle that
//! replays canned replies and records what it was asked.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use browsing_agent::agent::{Agent, IdentityStore, MemoryIdentityStore};
use browsing_agent::core::{AgentError, Config, Message, Result, ToolCall, ToolDefinition};
use browsing_agent::llm::{
    AssistantSpec, AssistantThread, GenerateOptions, LLMProvider, LLMResponse, Lookup,
    RemoteAssistant, StreamCallback,
};
use browsing_agent::tools::browser::{
    BrowserEngine, BrowserError, BrowserManager, ElementLocator, EngineLauncher,
    HostEnvironment, PageHandle, Viewport,
};
use browsing_agent::tools::content::DirectorySink;
use browsing_agent::tools::browser::BrowserToolSettings;
use browsing_agent::tools::ToolRegistry;
use browsing_agent::core::config::BrowserConfig;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PAGE_TEXT: &str = "Paris weather today: 15°C and cloudy.";

/// State shared between a fake engine, its pages and the test
#[derive(Default)]
pub struct FakeBrowser {
    pub launches: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub engine_shutdowns: AtomicUsize,
    /// Launch attempts fail
    pub fail_launch: AtomicBool,
    /// Newly opened pages are already dead
    pub pages_born_dead: AtomicBool,
    /// Every page action, e.g. `navigate https://...`
    pub actions: Mutex<Vec<String>>,
    pub pages: Mutex<Vec<Arc<FakePage>>>,
    /// Cancelled the first time any page navigates
    pub cancel_on_navigate: Mutex<Option<CancellationToken>>,
    /// Navigation waits while a test holds this
    pub navigation_gate: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn page(&self, index: usize) -> Arc<FakePage> {
        Arc::clone(&self.pages.lock().unwrap()[index])
    }

    /// Close the most recent page behind the session's back
    pub fn crash_current_page(&self) {
        if let Some(page) = self.pages.lock().unwrap().last() {
            page.closed.store(true, Ordering::SeqCst);
        }
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }
}

pub struct FakePage {
    id: u64,
    viewport: Viewport,
    pub closed: AtomicBool,
    url: Mutex<String>,
    history: Mutex<Vec<String>>,
    browser: Arc<FakeBrowser>,
}

impl FakePage {
    fn check(&self) -> std::result::Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::PageUnavailable(format!("page {} closed", self.id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PageHandle for FakePage {
    fn id(&self) -> u64 {
        self.id
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn navigate(&self, url: &str) -> std::result::Result<String, BrowserError> {
        let _open = self.browser.navigation_gate.lock().await;
        self.check()?;
        let previous = std::mem::replace(&mut *self.url.lock().unwrap(), url.to_string());
        self.history.lock().unwrap().push(previous);
        self.browser.record(format!("navigate {}", url));
        if let Some(token) = self.browser.cancel_on_navigate.lock().unwrap().take() {
            token.cancel();
        }
        Ok(url.to_string())
    }

    async fn current_url(&self) -> std::result::Result<String, BrowserError> {
        self.check()?;
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> std::result::Result<String, BrowserError> {
        self.check()?;
        Ok("Fake page".to_string())
    }

    async fn text_content(&self) -> std::result::Result<String, BrowserError> {
        self.check()?;
        Ok(PAGE_TEXT.to_string())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> std::result::Result<(), BrowserError> {
        self.check()?;
        self.browser.record(format!("scroll {} {}", dx, dy));
        Ok(())
    }

    async fn go_back(&self) -> std::result::Result<String, BrowserError> {
        self.check()?;
        let previous = self.history.lock().unwrap().pop().unwrap_or_default();
        *self.url.lock().unwrap() = previous.clone();
        self.browser.record("go_back".to_string());
        Ok(previous)
    }

    async fn click(&self, locator: &ElementLocator) -> std::result::Result<(), BrowserError> {
        self.check()?;
        if *locator == ElementLocator::Css("#missing".into()) {
            return Err(BrowserError::ElementNotFound(locator.to_string()));
        }
        self.browser.record(format!("click {} on page {}", locator, self.id));
        Ok(())
    }

    async fn type_text(
        &self,
        locator: &ElementLocator,
        text: &str,
        submit: bool,
    ) -> std::result::Result<(), BrowserError> {
        self.check()?;
        self.browser
            .record(format!("type {} into {} submit={}", text, locator, submit));
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeEngine {
    browser: Arc<FakeBrowser>,
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn open_page(
        &self,
        viewport: Viewport,
    ) -> std::result::Result<Arc<dyn PageHandle>, BrowserError> {
        let id = self.browser.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let page = Arc::new(FakePage {
            id,
            viewport,
            closed: AtomicBool::new(self.browser.pages_born_dead.load(Ordering::SeqCst)),
            url: Mutex::new("about:blank".to_string()),
            history: Mutex::new(Vec::new()),
            browser: Arc::clone(&self.browser),
        });
        self.browser.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.browser.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    async fn shutdown(&self) -> std::result::Result<(), BrowserError> {
        self.browser.engine_shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub browser: Arc<FakeBrowser>,
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(
        &self,
        _config: &BrowserConfig,
        _host: &HostEnvironment,
    ) -> std::result::Result<Box<dyn BrowserEngine>, BrowserError> {
        self.browser.launches.fetch_add(1, Ordering::SeqCst);
        if self.browser.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailed("no display".into()));
        }
        Ok(Box::new(FakeEngine {
            browser: Arc::clone(&self.browser),
        }))
    }
}

pub fn browser_config() -> BrowserConfig {
    BrowserConfig {
        locale: Some("en-US".into()),
        timezone: Some("UTC".into()),
        ..BrowserConfig::default()
    }
}

pub fn manager(browser: &Arc<FakeBrowser>) -> Arc<BrowserManager> {
    Arc::new(BrowserManager::new(
        browser_config(),
        Arc::new(FakeLauncher {
            browser: Arc::clone(browser),
        }),
    ))
}

/// Oracle that replays a script of replies
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<LLMResponse>>,
    assistants: Mutex<HashMap<String, RemoteAssistant>>,
    pub created: AtomicUsize,
    pub retrievals: AtomicUsize,
    /// Messages sent on each chat call
    pub requests: Mutex<Vec<Vec<Message>>>,
    /// Tool names offered on each chat call
    pub offered_tools: Mutex<Vec<Vec<String>>>,
    /// Assistant that answered each chat call
    pub answered_by: Mutex<Vec<String>>,
    /// Roles of the messages new to the thread on each chat call
    pub delivered_roles: Mutex<Vec<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<LLMResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn chat_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Forget an assistant on the oracle side
    pub fn forget(&self, id: &str) {
        self.assistants.lock().unwrap().remove(id);
    }

    fn next(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.answered_by
            .lock()
            .unwrap()
            .push(thread.assistant_id.clone());
        self.delivered_roles.lock().unwrap().push(
            thread
                .undelivered(messages)
                .iter()
                .map(|m| m.role.clone())
                .collect(),
        );
        thread.mark_delivered(messages.len());
        self.requests.lock().unwrap().push(messages.to_vec());
        self.offered_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name().to_string()).collect());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::oracle("rate limit exceeded"))
    }
}

#[async_trait]
impl LLMProvider for ScriptedOracle {
    async fn retrieve_assistant(&self, id: &str) -> Result<Lookup<RemoteAssistant>> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        Ok(match self.assistants.lock().unwrap().get(id) {
            Some(assistant) => Lookup::Found(assistant.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<RemoteAssistant> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let assistant = RemoteAssistant {
            id: format!("asst_{}", n),
            name: Some(spec.name.clone()),
            model: spec.model.clone(),
            instructions: Some(spec.instructions.clone()),
        };
        self.assistants
            .lock()
            .unwrap()
            .insert(assistant.id.clone(), assistant.clone());
        Ok(assistant)
    }

    async fn chat_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        self.next(thread, messages, tools)
    }

    async fn chat_stream_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
        on_token: StreamCallback,
    ) -> Result<LLMResponse> {
        let response = self.next(thread, messages, tools)?;
        for word in response.content.split_inclusive(' ') {
            on_token(word);
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

/// Reply requesting one tool
pub fn tool_reply(id: &str, name: &str, arguments: Value) -> LLMResponse {
    LLMResponse::with_tools("", vec![call(id, name, arguments)])
}

/// Everything an agent test needs
pub struct Harness {
    pub agent: Agent,
    pub oracle: Arc<ScriptedOracle>,
    pub browser: Arc<FakeBrowser>,
    pub store: Arc<MemoryIdentityStore>,
    pub output: TempDir,
}

pub fn test_config(output: &TempDir) -> Config {
    let mut config = Config::default();
    config.oracle.api_key = "sk-test".into();
    config.browser = browser_config();
    config.storage.output_dir = output.path().to_path_buf();
    config
}

pub fn registry(browser: &Arc<FakeBrowser>, output: &TempDir) -> ToolRegistry {
    ToolRegistry::new(
        manager(browser),
        BrowserToolSettings::from(&browser_config()),
        Arc::new(DirectorySink::new(output.path())),
    )
}

pub fn harness(script: Vec<LLMResponse>) -> Harness {
    harness_with(script, |_| {})
}

pub fn harness_with(script: Vec<LLMResponse>, tweak: impl FnOnce(&mut Config)) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let mut config = test_config(&output);
    tweak(&mut config);

    let oracle = ScriptedOracle::new(script);
    let browser = FakeBrowser::new();
    let store = Arc::new(MemoryIdentityStore::new());
    let tools = Arc::new(registry(&browser, &output));

    let agent = Agent::new(
        config,
        Arc::clone(&oracle) as Arc<dyn LLMProvider>,
        Arc::clone(&store) as Arc<dyn IdentityStore>,
        tools,
    );

    Harness {
        agent,
        oracle,
        browser,
        store,
        output,
    }
}
