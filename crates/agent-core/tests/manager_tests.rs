//! Audio routing, bridge events, authentication and construction

mod common;

use std::sync::Arc;
use std::time::Duration;

use callcenter_agent_core::{
    AgentConfig, AgentError, AgentEvent, AgentManager, AgentStatus, AudioDevices, BridgeEvent,
    MemoryTokenStore, NoticeSeverity, TokenStore,
};
use common::{agent_token, clinics, FakeApi, FakeBridge, Harness, Reply, AGENT_ID};

#[tokio::test]
async fn test_toggle_mute_round_trip() {
    let mut h = Harness::online().await;

    assert!(h.manager.toggle_mute().await.unwrap());
    assert!(h.manager.is_muted());
    assert!(!h.manager.toggle_mute().await.unwrap());
    assert!(!h.manager.is_muted());

    assert_eq!(h.bridge.calls(), vec!["mute", "unmute"]);
    let mutes: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::MuteChanged { muted } => Some(muted),
            _ => None,
        })
        .collect();
    assert_eq!(mutes, vec![true, false]);
}

#[tokio::test]
async fn test_toggle_mute_failure_keeps_state() {
    let mut h = Harness::online().await;
    *h.bridge.mute.lock() = Reply::Declined;

    assert!(h.manager.toggle_mute().await.is_err());
    assert!(!h.manager.is_muted());

    let notices = h.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, NoticeSeverity::Error);
    assert_eq!(notices[0].message, "Failed to toggle mute. Please try again.");
}

#[tokio::test]
async fn test_device_selection() {
    let mut h = Harness::online().await;

    h.manager.select_audio_input("mic-2").await.unwrap();
    assert_eq!(h.manager.selected_input().as_deref(), Some("mic-2"));

    *h.bridge.set_input.lock() = Reply::Declined;
    assert!(h.manager.select_audio_input("mic-1").await.is_err());
    assert_eq!(h.manager.selected_input().as_deref(), Some("mic-2"));

    *h.bridge.set_output.lock() = Reply::Fail("route unavailable");
    assert!(matches!(
        h.manager.select_audio_output("speaker-2").await,
        Err(AgentError::Bridge { operation: "set_audio_output_device", .. })
    ));
    assert_eq!(h.manager.selected_output().as_deref(), Some("speaker-1"));

    let messages: Vec<_> = h.notices().into_iter().map(|n| n.message).collect();
    assert_eq!(
        messages,
        vec![
            "Failed to set audio input device.".to_string(),
            "Failed to set audio output device.".to_string()
        ]
    );
}

#[tokio::test]
async fn test_device_listing_failure_yields_empty_lists() {
    let mut h = Harness::online().await;
    *h.bridge.devices.lock() = None;

    let devices = h.manager.refresh_audio_devices().await;

    assert_eq!(devices, AudioDevices::default());
    assert!(h.manager.audio_inputs().is_empty());
    assert!(h
        .drain()
        .contains(&AgentEvent::DevicesChanged(AudioDevices::default())));
}

#[tokio::test]
async fn test_unlock_audio() {
    let mut h = Harness::online().await;
    assert!(h.manager.unlock_audio().await.unwrap());

    *h.bridge.unlock.lock() = Reply::Declined;
    assert!(!h.manager.unlock_audio().await.unwrap());
    assert!(h.notices().is_empty());

    *h.bridge.unlock.lock() = Reply::Fail("focus held by another app");
    assert!(h.manager.unlock_audio().await.is_err());
    assert_eq!(h.notices()[0].message, "Failed to unlock audio.");
}

#[tokio::test]
async fn test_bridge_events_update_state() {
    let mut h = Harness::online().await;
    assert!(h.manager.is_connected());

    let task = h.manager.attach_bridge_events(futures::stream::iter(vec![
        BridgeEvent::AudioStatusChanged { muted: true },
        BridgeEvent::AudioStatusChanged { muted: true },
        BridgeEvent::DeviceChanged {
            input_device: Some("mic-2".to_string()),
            output_device: None,
        },
        BridgeEvent::Error {
            code: "E42".to_string(),
            message: String::new(),
        },
        BridgeEvent::MeetingEnded {
            meeting_id: Some("meeting-1".to_string()),
        },
    ]));
    task.await.unwrap();

    assert!(h.manager.is_muted());
    assert!(!h.manager.is_connected());
    assert_eq!(h.manager.selected_input().as_deref(), Some("mic-2"));
    assert_eq!(h.manager.selected_output().as_deref(), Some("speaker-1"));

    let events = h.drain();
    let mute_events = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::MuteChanged { .. }))
        .count();
    assert_eq!(mute_events, 1, "repeated mute report is not re-published");
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::Notice(n) if n.title == "Call Error" && n.message == "An error occurred with the call"
    )));

    h.manager.handle_bridge_event(BridgeEvent::MeetingStarted { meeting_id: None });
    assert!(h.manager.is_connected());
}

#[tokio::test]
async fn test_invalid_token_leaves_agent_unauthenticated() {
    let h = Harness::signed_in().await;
    assert_eq!(h.manager.agent_id().as_deref(), Some(AGENT_ID));

    let err = h
        .manager
        .set_auth_token(Some("not-a-token".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::InvalidToken { .. }));
    assert!(!h.manager.is_authenticated());
    assert!(h.manager.available_clinics().is_empty());
    assert!(matches!(
        h.manager.go_online(&clinics(&["clinicA"])).await,
        Err(AgentError::NotAuthenticated)
    ));
}

fn manager_with_store(store: Arc<MemoryTokenStore>) -> (AgentManager, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::default());
    let manager = AgentManager::builder()
        .config(common::test_config())
        .bridge(Arc::new(FakeBridge::default()))
        .api(api.clone())
        .token_store(store)
        .build()
        .unwrap();
    (manager, api)
}

#[tokio::test]
async fn test_restore_token_from_store() {
    let (manager, api) = manager_with_store(Arc::new(MemoryTokenStore::with_token(agent_token())));

    assert!(manager.restore_token().await.unwrap());
    assert_eq!(manager.agent_id().as_deref(), Some(AGENT_ID));
    assert_eq!(api.token.lock().as_deref(), Some(agent_token().as_str()));

    let ids: Vec<_> = manager
        .available_clinics()
        .into_iter()
        .map(|clinic| clinic.clinic_id)
        .collect();
    assert_eq!(ids, vec!["clinicA".to_string(), "clinicB".to_string()]);

    let (empty, _) = manager_with_store(Arc::new(MemoryTokenStore::new()));
    assert!(!empty.restore_token().await.unwrap());
    assert!(!empty.is_authenticated());
}

#[tokio::test]
async fn test_sign_in_and_sign_out() {
    let store = Arc::new(MemoryTokenStore::new());
    let (manager, api) = manager_with_store(store.clone());

    manager.sign_in(agent_token()).await.unwrap();
    assert_eq!(store.load().await.unwrap(), Some(agent_token()));

    manager.go_online(&clinics(&["clinicB"])).await.unwrap();
    assert_eq!(manager.status(), AgentStatus::Online);

    manager.sign_out().await.unwrap();
    assert_eq!(manager.status(), AgentStatus::Offline);
    assert!(api.called("stop_session"));
    assert!(!manager.is_authenticated());
    assert_eq!(store.load().await.unwrap(), None);
    assert_eq!(*api.token.lock(), None);
}

#[test]
fn test_builder_requires_bridge_and_valid_config() {
    let missing_bridge = AgentManager::builder()
        .api(Arc::new(FakeApi::default()))
        .build();
    assert!(matches!(missing_bridge, Err(AgentError::Configuration { .. })));

    let bad_interval = AgentManager::builder()
        .bridge(Arc::new(FakeBridge::default()))
        .api(Arc::new(FakeApi::default()))
        .status_poll_interval(Duration::ZERO)
        .build();
    assert!(matches!(bad_interval, Err(AgentError::Configuration { .. })));

    let manager = AgentManager::builder()
        .config(AgentConfig::default())
        .connection_timeout(Duration::from_secs(10))
        .bridge(Arc::new(FakeBridge::default()))
        .api(Arc::new(FakeApi::default()))
        .build()
        .unwrap();
    assert_eq!(manager.config().connection_timeout, Duration::from_secs(10));
    assert_eq!(manager.status(), AgentStatus::Offline);
    assert!(!manager.is_polling());
}
