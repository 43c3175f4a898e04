//! Target manager against the mock browser, in both connection modes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use chrome_debugger::protocol::target::AttachedToTarget;
use chrome_debugger::{
    Connection, ConnectionOptions, CreateOptions, Error, EventFilter, Manager, ManagerOptions,
    TargetId,
};
use futures_util::StreamExt;
use serde_json::json;

use common::{MockBrowser, init_tracing, wait_until};

async fn manager(mock: &MockBrowser, multiplex: bool) -> Manager {
    init_tracing();
    let root = Connection::open(&mock.ws_url(), ConnectionOptions::default())
        .await
        .expect("root");
    Manager::new(root, ManagerOptions::new(mock.ws_url()).multiplex(multiplex))
        .await
        .expect("manager")
}

fn blank(incognito: bool) -> CreateOptions {
    CreateOptions {
        url: "about:blank".to_string(),
        incognito,
        width: 1024,
        height: 768,
    }
}

#[tokio::test]
async fn start_enables_discovery() {
    let mock = MockBrowser::start().await;
    let _manager = manager(&mock, true).await;
    assert_eq!(mock.count("Target.setDiscoverTargets"), 1);
}

#[tokio::test]
async fn multiplexed_create_shares_root_connection() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;

    let target = manager.create(blank(false)).await?;

    assert!(target.session_id().is_some());
    assert!(target.connection()?.same_as(manager.root()));
    assert_eq!(manager.len(), 1);
    assert_eq!(mock.paths().len(), 1);

    let create = mock
        .received()
        .into_iter()
        .find(|r| r.method == "Target.createTarget")
        .expect("createTarget");
    assert_eq!(create.params, json!({"url": "about:blank", "width": 1024, "height": 768}));

    let attach = mock
        .received()
        .into_iter()
        .find(|r| r.method == "Target.attachToTarget")
        .expect("attachToTarget");
    assert_eq!(attach.params["flatten"], true);
    Ok(())
}

#[tokio::test]
async fn multiplexed_commands_carry_session_id() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let target = manager.create(blank(false)).await?;

    let result = target.send("Test.echo", Some(json!({"v": 1}))).await?;
    assert_eq!(result, json!({"v": 1}));

    let echo = mock
        .received()
        .into_iter()
        .find(|r| r.method == "Test.echo")
        .expect("echo");
    assert_eq!(echo.session_id, target.session_id().map(|s| s.to_string()));
    Ok(())
}

#[tokio::test]
async fn close_removes_target_and_keeps_root_open() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;

    let first = manager.create(blank(false)).await?;
    let second = manager.create(blank(false)).await?;

    manager.close(&first).await?;

    assert!(first.is_closed());
    assert!(manager.get(first.id()).is_none());
    assert!(manager.get(second.id()).is_some());
    assert!(!manager.root().is_closed());

    let listed: Vec<TargetId> = manager.list().await?.into_iter().map(|t| t.target_id).collect();
    assert!(!listed.contains(first.id()));
    assert!(listed.contains(second.id()));

    assert_eq!(second.send("Test.echo", Some(json!({"still": "alive"}))).await?["still"], "alive");
    Ok(())
}

#[tokio::test]
async fn closing_twice_is_rejected_without_wire_traffic() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let target = manager.create(blank(false)).await?;

    target.close().await?;
    let err = manager.close(&target).await.expect_err("already closed");

    assert!(err.is_target_closed());
    assert_eq!(mock.count("Target.closeTarget"), 1);

    let sent = mock.received().len();
    assert!(target.send("Test.echo", None).await.expect_err("closed").is_target_closed());
    assert_eq!(mock.received().len(), sent);
    Ok(())
}

#[tokio::test]
async fn concurrent_close_has_one_winner() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let target = manager.create(blank(false)).await?;

    let (a, b) = tokio::join!(manager.close(&target), manager.close(&target));

    assert!(a.is_ok() != b.is_ok());
    assert_eq!(mock.count("Target.closeTarget"), 1);
    Ok(())
}

#[tokio::test]
async fn dedicated_mode_opens_page_connection() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, false).await;

    let target = manager.create(blank(false)).await?;
    let page = target.connection()?;

    assert!(target.session_id().is_none());
    assert!(!page.same_as(manager.root()));
    let expected = format!("ws://{}/devtools/page/{}", mock.host_port(), target.id());
    assert_eq!(page.url(), Some(expected.as_str()));

    target.send("Test.echo", None).await?;
    let echo = mock
        .received()
        .into_iter()
        .find(|r| r.method == "Test.echo")
        .expect("echo");
    assert_eq!(echo.path, format!("/devtools/page/{}", target.id()));
    assert!(echo.session_id.is_none());

    manager.close(&target).await?;
    assert!(page.is_closed());
    assert!(!manager.root().is_closed());
    Ok(())
}

#[tokio::test]
async fn incognito_context_is_created_and_disposed() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;

    let target = manager.create(blank(true)).await?;
    let context = target.browser_context_id().cloned().expect("context");
    assert!(mock.contexts().contains(&context.to_string()));
    assert_eq!(
        mock.targets()[0].context.as_deref(),
        Some(context.as_str())
    );

    target.close().await?;
    assert!(mock.contexts().is_empty());
    assert_eq!(mock.count("Target.disposeBrowserContext"), 1);
    Ok(())
}

#[tokio::test]
async fn browser_destroyed_target_is_reconciled() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let target = manager.create(blank(false)).await?;

    let hanging = {
        let target = target.clone();
        tokio::spawn(async move { target.send("Test.hang", None).await })
    };
    assert!(wait_until(|| mock.count("Test.hang") == 1).await);

    mock.destroy_target(target.id().as_str());

    let err = hanging.await?.expect_err("target gone");
    assert!(matches!(err, Error::TargetClosed { ref target_id } if target_id == target.id()));
    assert!(wait_until(|| target.is_closed() && manager.is_empty()).await);
    assert!(!manager.root().is_closed());
    Ok(())
}

#[tokio::test]
async fn dedicated_target_destroyed_closes_its_connection() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, false).await;
    let target = manager.create(blank(false)).await?;
    let page = target.connection()?;

    mock.destroy_target(target.id().as_str());

    assert!(wait_until(|| target.is_closed() && page.is_closed()).await);
    assert!(manager.get(target.id()).is_none());
    Ok(())
}

#[tokio::test]
async fn attach_external_target() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let external = mock.add_target("https://example.com/");

    let info = manager
        .list()
        .await?
        .into_iter()
        .find(|t| t.target_id.as_str() == external)
        .expect("listed");
    assert!(manager.is_empty());

    let target = manager.attach(&info).await?;
    let again = manager.attach(&info).await?;

    assert_eq!(target, again);
    assert_eq!(mock.count("Target.attachToTarget"), 1);
    assert_eq!(target.info().await?.url, "https://example.com/");
    Ok(())
}

#[tokio::test]
async fn target_events_are_scoped_to_its_session() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let first = manager.create(blank(false)).await?;
    let second = manager.create(blank(false)).await?;

    let mut events = first.events(EventFilter::new().domain("Page"))?;
    let other = second.session_id().expect("session");
    let own = first.session_id().expect("session");

    mock.emit(json!({"method": "Page.loadEventFired", "params": {"who": "second"}, "sessionId": other.as_str()}));
    mock.emit(json!({"method": "Page.loadEventFired", "params": {"who": "first"}, "sessionId": own.as_str()}));

    let frame = tokio::time::timeout(Duration::from_secs(2), events.next())
        .await?
        .expect("frame");
    assert_eq!(frame.params["who"], "first");
    Ok(())
}

#[tokio::test]
async fn attached_event_is_observable() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, true).await;
    let mut attached = manager.root().subscribe::<AttachedToTarget>(None)?;

    let target = manager.create(blank(false)).await?;

    let event = tokio::time::timeout(Duration::from_secs(2), attached.next())
        .await?
        .expect("event");
    assert_eq!(&event.target_info.target_id, target.id());
    assert_eq!(Some(event.session_id), target.session_id());
    Ok(())
}

#[tokio::test]
async fn close_all_is_idempotent_and_final() -> anyhow::Result<()> {
    let mock = MockBrowser::start().await;
    let manager = manager(&mock, false).await;

    let first = manager.create(blank(false)).await?;
    let second = manager.create(blank(false)).await?;
    let page = second.connection()?;

    manager.close_all().await;
    manager.close_all().await;

    assert!(first.is_closed() && second.is_closed());
    assert!(page.is_closed());
    assert!(manager.root().is_closed());
    assert_eq!(mock.count("Target.closeTarget"), 2);

    assert!(matches!(manager.create(blank(false)).await, Err(Error::ConnectionClosed)));
    assert!(matches!(manager.list().await, Err(Error::ConnectionClosed)));
    assert!(first.send("Test.echo", None).await.expect_err("closed").is_target_closed());
    Ok(())
}
