//! Process-wide browser session
//!
//! `BrowserManager` owns the single `BrowserSession`: it constructs it on
//! first use, refuses a second direct construction, and tears it down once.
//! The session holds exactly one current page and replaces it on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::core::config::BrowserConfig;
use crate::tools::browser::engine::{BrowserEngine, EngineLauncher, PageHandle, Viewport};
use crate::tools::browser::error::BrowserError;
use crate::tools::browser::host::HostEnvironment;

/// One browser process and its current page
pub struct BrowserSession {
    engine: Box<dyn BrowserEngine>,
    viewport: Viewport,
    page: RwLock<Arc<dyn PageHandle>>,
    replacements: AtomicU64,
}

impl BrowserSession {
    async fn start(engine: Box<dyn BrowserEngine>, viewport: Viewport) -> Result<Self, BrowserError> {
        let page = match engine.open_page(viewport).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(shutdown_err) = engine.shutdown().await {
                    warn!(error = %shutdown_err, "failed to stop browser after page error");
                }
                return Err(e);
            }
        };
        Ok(Self {
            engine,
            viewport,
            page: RwLock::new(page),
            replacements: AtomicU64::new(0),
        })
    }

    /// The live page. Do not keep it beyond a single tool invocation.
    pub async fn current_page(&self) -> Arc<dyn PageHandle> {
        Arc::clone(&*self.page.read().await)
    }

    /// Close the current page (tolerating it being gone) and open a fresh one
    /// with the fixed viewport.
    pub async fn reset_page(&self) -> Result<Arc<dyn PageHandle>, BrowserError> {
        let mut current = self.page.write().await;
        let old_id = current.id();

        if !current.is_closed() {
            if let Err(e) = current.close().await {
                warn!(page_id = old_id, error = %e, "failed to close page before reset");
            }
        }

        let page = match self.engine.open_page(self.viewport).await {
            Ok(page) => page,
            Err(e) => {
                error!(page_id = old_id, error = %e, "failed to open replacement page");
                return Err(e);
            }
        };

        *current = Arc::clone(&page);
        let count = self.replacements.fetch_add(1, Ordering::SeqCst) + 1;
        info!(old_page = old_id, new_page = page.id(), replacements = count, "page reset");
        Ok(page)
    }

    /// Fixed viewport every page is opened with
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// How many times the page has been replaced
    pub fn replacements(&self) -> u64 {
        self.replacements.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let page = self.current_page().await;
        if let Err(e) = page.close().await {
            warn!(page_id = page.id(), error = %e, "failed to close page during shutdown");
        }
        self.engine.shutdown().await
    }
}

enum Slot {
    Uninitialized,
    Active(Arc<BrowserSession>),
    Closed,
}

/// Owner of the process-wide [`BrowserSession`].
///
/// Create one at startup and pass it to whoever needs the browser.
pub struct BrowserManager {
    config: BrowserConfig,
    launcher: Arc<dyn EngineLauncher>,
    slot: Mutex<Slot>,
}

impl BrowserManager {
    pub fn new(config: BrowserConfig, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            config,
            launcher,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Return the session, constructing it on first call.
    ///
    /// Launch failures propagate; there is no retry.
    pub async fn acquire(&self) -> Result<Arc<BrowserSession>, BrowserError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Active(session) => Ok(Arc::clone(session)),
            Slot::Closed => Err(BrowserError::SessionClosed),
            Slot::Uninitialized => {
                let session = self.construct().await?;
                *slot = Slot::Active(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Construct the session directly. Fails with
    /// [`BrowserError::AlreadyInitialized`] if it already exists.
    pub async fn initialize(&self) -> Result<Arc<BrowserSession>, BrowserError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Active(_) => Err(BrowserError::AlreadyInitialized),
            Slot::Closed => Err(BrowserError::SessionClosed),
            Slot::Uninitialized => {
                let session = self.construct().await?;
                *slot = Slot::Active(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// The session if it has been constructed and not shut down
    pub async fn current(&self) -> Option<Arc<BrowserSession>> {
        match &*self.slot.lock().await {
            Slot::Active(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Replace the current page of the live session
    pub async fn reset_page(&self) -> Result<Arc<dyn PageHandle>, BrowserError> {
        let session = self.acquire().await?;
        session.reset_page().await
    }

    /// Close the browser. Safe to call more than once.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Closed);
        if let Slot::Active(session) = previous {
            match session.close().await {
                Ok(()) => info!("browser instance closed"),
                Err(e) => error!(error = %e, "failed to close browser instance"),
            }
        }
    }

    async fn construct(&self) -> Result<Arc<BrowserSession>, BrowserError> {
        let host = HostEnvironment::detect(&self.config);
        info!(locale = %host.locale, timezone = %host.timezone, "starting browser session");

        let engine = match self.launcher.launch(&self.config, &host).await {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "failed to create browser instance");
                return Err(e);
            }
        };

        let session = BrowserSession::start(engine, Viewport::from(&self.config)).await?;
        info!("browser instance created");
        Ok(Arc::new(session))
    }
}
