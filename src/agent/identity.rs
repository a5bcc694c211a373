//! Assistant identity resolution
//!
//! Each role maps to one remote assistant id. The id is kept in an
//! [`IdentityStore`]; when it is missing or the oracle no longer knows it, a
//! new assistant is created and resolution is retried exactly once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::agent::loop_state::{AgentLoopState, ConversationPhase};
use crate::agent::roles::AgentRole;
use crate::core::{AgentError, Result, ToolDefinition};
use crate::llm::{AssistantSpec, LLMProvider, Lookup};

/// A role's assistant as known to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantIdentity {
    /// Role name
    pub name: String,
    pub remote_id: String,
    pub instructions: String,
}

/// Result of [`IdentityStore::compare_and_set`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Stored,
    /// Another writer changed the entry first; carries what is stored now
    Conflict(Option<AssistantIdentity>),
}

/// Persistent role -> identity map
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get(&self, role: AgentRole) -> Result<Option<AssistantIdentity>>;

    /// Store `identity` only if the current remote id equals `expected`
    async fn compare_and_set(
        &self,
        role: AgentRole,
        expected: Option<&str>,
        identity: AssistantIdentity,
    ) -> Result<CasOutcome>;
}

fn apply_cas(
    entries: &mut HashMap<String, AssistantIdentity>,
    role: AgentRole,
    expected: Option<&str>,
    identity: AssistantIdentity,
) -> CasOutcome {
    let current = entries.get(role.as_str());
    if current.map(|i| i.remote_id.as_str()) != expected {
        return CasOutcome::Conflict(current.cloned());
    }
    entries.insert(role.as_str().to_string(), identity);
    CasOutcome::Stored
}

/// In-process store
#[derive(Default)]
pub struct MemoryIdentityStore {
    entries: Mutex<HashMap<String, AssistantIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, role: AgentRole) -> Result<Option<AssistantIdentity>> {
        Ok(self.entries.lock().await.get(role.as_str()).cloned())
    }

    async fn compare_and_set(
        &self,
        role: AgentRole,
        expected: Option<&str>,
        identity: AssistantIdentity,
    ) -> Result<CasOutcome> {
        let mut entries = self.entries.lock().await;
        Ok(apply_cas(&mut entries, role, expected, identity))
    }
}

/// JSON file store, one object keyed by role name
pub struct FileIdentityStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<HashMap<String, AssistantIdentity>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                AgentError::identity(format!(
                    "corrupt identity store {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, entries: &HashMap<String, AssistantIdentity>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self, role: AgentRole) -> Result<Option<AssistantIdentity>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(role.as_str()))
    }

    async fn compare_and_set(
        &self,
        role: AgentRole,
        expected: Option<&str>,
        identity: AssistantIdentity,
    ) -> Result<CasOutcome> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        let outcome = apply_cas(&mut entries, role, expected, identity);
        if outcome == CasOutcome::Stored {
            self.write(&entries).await?;
        }
        Ok(outcome)
    }
}

/// Looks up role identities, creating them on a miss
pub struct IdentityResolver {
    llm: Arc<dyn LLMProvider>,
    store: Arc<dyn IdentityStore>,
    model: String,
    sentinel: String,
    creation: Mutex<()>,
}

impl IdentityResolver {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        store: Arc<dyn IdentityStore>,
        model: impl Into<String>,
        sentinel: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            store,
            model: model.into(),
            sentinel: sentinel.into(),
            creation: Mutex::new(()),
        }
    }

    /// Resolve `role`, creating its assistant when missing.
    ///
    /// Creation happens at most once per call; a miss after creating is an
    /// [`AgentError::Identity`].
    pub async fn resolve(
        &self,
        role: AgentRole,
        tools: &[ToolDefinition],
        state: &mut AgentLoopState,
    ) -> Result<AssistantIdentity> {
        let mut created = false;
        loop {
            state.enter(ConversationPhase::ResolvingIdentity);
            let (observed, lookup) = self.lookup(role).await?;
            match lookup {
                Lookup::Found(identity) => {
                    info!(role = %role, remote_id = %identity.remote_id, "assistant resolved");
                    return Ok(identity);
                }
                Lookup::NotFound if created => {
                    return Err(AgentError::identity(format!(
                        "assistant for {} still not found after creation",
                        role
                    )));
                }
                Lookup::NotFound => {
                    warn!(role = %role, "assistant not found, creating new assistant");
                    state.enter(ConversationPhase::CreatingIdentity);
                    self.create(role, tools, observed).await?;
                    created = true;
                }
            }
        }
    }

    /// Stored id (if any) and whether the oracle still knows it
    async fn lookup(&self, role: AgentRole) -> Result<(Option<String>, Lookup<AssistantIdentity>)> {
        let Some(identity) = self.store.get(role).await? else {
            return Ok((None, Lookup::NotFound));
        };

        let observed = Some(identity.remote_id.clone());
        match self.llm.retrieve_assistant(&identity.remote_id).await? {
            Lookup::Found(_) => Ok((observed, Lookup::Found(identity))),
            Lookup::NotFound => {
                warn!(role = %role, remote_id = %identity.remote_id, "stored assistant id is unknown to the oracle");
                Ok((observed, Lookup::NotFound))
            }
        }
    }

    async fn create(
        &self,
        role: AgentRole,
        tools: &[ToolDefinition],
        observed: Option<String>,
    ) -> Result<()> {
        let _creating = self.creation.lock().await;

        // A conversation that held the lock before us may have created it
        let (observed, lookup) = match self.store.get(role).await? {
            Some(current) if Some(&current.remote_id) != observed.as_ref() => {
                self.lookup(role).await?
            }
            _ => (observed, Lookup::NotFound),
        };
        if let Lookup::Found(_) = lookup {
            return Ok(());
        }

        let instructions = role.instructions(&self.sentinel);
        let spec = AssistantSpec {
            name: role.as_str().to_string(),
            model: self.model.clone(),
            instructions: instructions.clone(),
            tools: tools.to_vec(),
        };

        let remote = self.llm.create_assistant(&spec).await.map_err(|e| {
            AgentError::identity(format!("failed to create assistant for {}: {}", role, e))
        })?;

        let identity = AssistantIdentity {
            name: role.as_str().to_string(),
            remote_id: remote.id.clone(),
            instructions,
        };

        match self
            .store
            .compare_and_set(role, observed.as_deref(), identity)
            .await?
        {
            CasOutcome::Stored => {
                info!(role = %role, remote_id = %remote.id, "assistant created and stored");
            }
            CasOutcome::Conflict(winner) => {
                warn!(
                    role = %role,
                    orphaned = %remote.id,
                    winner = winner.as_ref().map(|w| w.remote_id.as_str()).unwrap_or("none"),
                    "another writer stored an assistant first; keeping theirs"
                );
            }
        }
        Ok(())
    }
}
