//! Integration tests for account re-registration through the coordinator

mod common;

use std::sync::Arc;

use common::*;
use rvoip_softphone_core::{
    AccountForm, CredentialStore, JsonFileStore, MenuAction, RegistrationPhase, SoftphoneBuilder, SoftphoneError,
    SoftphoneEvent,
};

fn new_account_form() -> AccountForm {
    AccountForm::new("alice", "new.example.com", "new-secret").with_outbound_proxy("sip:proxy.new.example.com:5060;lr")
}

#[tokio::test]
async fn test_apply_unregisters_then_registers() {
    let (softphone, _stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();

    softphone.apply_account(new_account_form()).await.unwrap();
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Unregistering);
    assert_eq!(next_command(&mut commands).await, Recorded::Unregister(account()));
    // Not committed before the unregister succeeds
    assert_eq!(softphone.active_credentials().await, Some(account()));

    softphone.on_register_success(&registrar_ok()).await;
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Registering);
    let committed = new_account_form().validate().unwrap();
    assert_eq!(softphone.active_credentials().await, Some(committed.clone()));
    assert_eq!(next_command(&mut commands).await, Recorded::Register(committed));

    softphone.on_register_success(&registrar_ok()).await;
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);

    let emitted = drain_events(&mut events);
    let steps: Vec<u8> = emitted
        .iter()
        .filter_map(|event| match event {
            SoftphoneEvent::RegistrationProgress { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![0, 1, 2]);
    assert!(emitted.contains(&SoftphoneEvent::status("Account registered")));
}

#[tokio::test]
async fn test_invalid_proxy_produces_one_notification() {
    let (softphone, _stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();

    let form = AccountForm::new("bob", "example.com", "pw").with_outbound_proxy("sip:proxy..example.com");
    let err = softphone.apply_account(form).await.unwrap_err();
    assert!(err.is_validation_error());

    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
    assert_eq!(softphone.active_credentials().await, Some(account()));

    let emitted = drain_events(&mut events);
    assert_eq!(emitted.len(), 1);
    assert!(matches!(&emitted[0], SoftphoneEvent::ValidationFailed { field, .. } if field == "outbound_proxy"));
    assert_no_command(&mut commands).await;
}

#[tokio::test]
async fn test_second_apply_while_in_flight_is_refused() {
    let (softphone, _stack, mut commands) = softphone();
    softphone.apply_account(new_account_form()).await.unwrap();
    next_command(&mut commands).await;

    let err = softphone.apply_account(new_account_form()).await.unwrap_err();
    assert_eq!(err, SoftphoneError::RegistrationInProgress { phase: RegistrationPhase::Unregistering });
}

#[tokio::test]
async fn test_unregister_failure_keeps_old_account() {
    let (softphone, _stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();
    softphone.apply_account(new_account_form()).await.unwrap();
    next_command(&mut commands).await;

    softphone.on_register_failed(&rvoip_softphone_core::SipResponse::new(408, "Request Timeout")).await;

    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
    assert_eq!(softphone.active_credentials().await, Some(account()));
    let emitted = drain_events(&mut events);
    assert!(emitted.iter().any(|event| matches!(
        event,
        SoftphoneEvent::RegistrationFailed { note, detail, .. } if note == "Unregister failed" && detail == "408 Request Timeout"
    )));
    assert!(emitted.contains(&SoftphoneEvent::status("Registration failed")));
    assert_no_command(&mut commands).await;
}

#[tokio::test]
async fn test_register_command_failure_reported_as_register_failed() {
    let (softphone, stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();
    stack.fail("register");

    softphone.apply_account(new_account_form()).await.unwrap();
    next_command(&mut commands).await;
    softphone.on_register_success(&registrar_ok()).await;

    loop {
        if let SoftphoneEvent::RegistrationFailed { phase, note, .. } = next_event(&mut events).await {
            assert_eq!(phase, RegistrationPhase::Registering);
            assert_eq!(note, "Register failed");
            break;
        }
    }
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
}

#[tokio::test]
async fn test_commit_is_persisted_to_json_store() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("account.json");
    let store = Arc::new(JsonFileStore::new(&path));
    store.save(&account()).unwrap();

    let (stack, mut commands) = RecordingStack::new();
    let softphone = SoftphoneBuilder::new()
        .signaling_stack(stack)
        .credential_store(store.clone())
        .build()
        .unwrap();
    assert_eq!(softphone.active_credentials().await, Some(account()));

    softphone.apply_account(new_account_form()).await.unwrap();
    next_command(&mut commands).await;
    assert_eq!(store.load().unwrap(), Some(account()));

    softphone.on_register_success(&registrar_ok()).await;
    let reloaded = JsonFileStore::new(&path).load().unwrap().unwrap();
    assert_eq!(reloaded.domain, "new.example.com");
    assert_eq!(reloaded.outbound_proxy.map(|uri| uri.to_string()).as_deref(), Some("sip:proxy.new.example.com:5060;lr"));
}

#[tokio::test]
async fn test_start_registers_stored_account() {
    let (softphone, _stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();

    softphone.start().await.unwrap();
    assert_eq!(next_command(&mut commands).await, Recorded::Register(account()));

    softphone.on_register_success(&registrar_ok()).await;
    assert_eq!(next_event(&mut events).await, SoftphoneEvent::status("Account registered"));
}

#[tokio::test]
async fn test_account_menu_requests_form_with_current_values() {
    let (softphone, _stack, _commands) = softphone();
    let mut events = softphone.subscribe_events();

    softphone.on_menu_action(MenuAction::Account).await;
    assert_eq!(
        next_event(&mut events).await,
        SoftphoneEvent::AccountFormRequested { credentials: Some(account()) }
    );

    softphone.on_menu_action(MenuAction::Preferences).await;
    assert!(drain_events(&mut events).is_empty());
}
