//! Browser session lifecycle tests
//!
//! Run against a fake engine; see `live_browser.rs` for real Chrome.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use browsing_agent::tools::browser::{BrowserError, Viewport};
use common::{manager, FakeBrowser};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_acquire_returns_same_session() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    let first = assert_ok!(manager.acquire().await);
    let second = assert_ok!(manager.acquire().await);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
    assert_eq!(browser.pages_opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_acquire_launches_once() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    let (a, b) = tokio::join!(manager.acquire(), manager.acquire());

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_direct_initialize_after_acquire_fails() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    manager.acquire().await.unwrap();
    let err = manager.initialize().await.err().unwrap();

    assert!(matches!(err, BrowserError::AlreadyInitialized));
    assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initialize_then_acquire_shares_session() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    let initialized = manager.initialize().await.unwrap();
    let acquired = manager.acquire().await.unwrap();

    assert!(Arc::ptr_eq(&initialized, &acquired));
}

#[tokio::test]
async fn test_current_is_none_until_constructed() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    assert!(manager.current().await.is_none());
    manager.acquire().await.unwrap();
    assert!(manager.current().await.is_some());
}

#[tokio::test]
async fn test_reset_page_opens_fresh_page_with_same_viewport() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);
    let session = manager.acquire().await.unwrap();

    let before = session.current_page().await;
    let after = session.reset_page().await.unwrap();

    assert_ne!(before.id(), after.id());
    assert_eq!(before.viewport(), after.viewport());
    assert_eq!(after.viewport(), Viewport::new(960, 1080));
    assert!(before.is_closed());
    assert_eq!(session.current_page().await.id(), after.id());
    assert_eq!(session.replacements(), 1);
}

#[tokio::test]
async fn test_reset_tolerates_crashed_page() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);
    let session = manager.acquire().await.unwrap();

    browser.crash_current_page();
    let page = manager.reset_page().await.unwrap();

    assert!(!page.is_closed());
    assert_eq!(browser.pages_opened.load(Ordering::SeqCst), 2);
    assert_eq!(session.replacements(), 1);
}

#[tokio::test]
async fn test_launch_failure_propagates_without_retry() {
    let browser = FakeBrowser::new();
    browser.fail_launch.store(true, Ordering::SeqCst);
    let manager = manager(&browser);

    let err = manager.acquire().await.err().unwrap();

    assert!(matches!(err, BrowserError::LaunchFailed(_)));
    assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
    assert!(manager.current().await.is_none());
}

#[tokio::test]
async fn test_shutdown_is_final_and_idempotent() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);
    let session = manager.acquire().await.unwrap();
    let page = session.current_page().await;

    manager.shutdown().await;
    manager.shutdown().await;

    assert!(page.is_closed());
    assert_eq!(browser.engine_shutdowns.load(Ordering::SeqCst), 1);
    assert!(matches!(
        manager.acquire().await.err().unwrap(),
        BrowserError::SessionClosed
    ));
    assert!(manager.current().await.is_none());
}

#[tokio::test]
async fn test_shutdown_before_use_launches_nothing() {
    let browser = FakeBrowser::new();
    let manager = manager(&browser);

    manager.shutdown().await;

    assert_eq!(browser.launches.load(Ordering::SeqCst), 0);
    assert_eq!(browser.engine_shutdowns.load(Ordering::SeqCst), 0);
}
