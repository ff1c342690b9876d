//! Integration tests for the window-close protocol
//!
//! Time is paused, so the grace timer fires as soon as the runtime is idle and
//! elapsed time is exact.

mod common;

use std::time::Duration;

use common::*;
use rvoip_softphone_core::{AccountForm, ExitReason, MenuAction, RegistrationPhase, SoftphoneError, SoftphoneEvent};
use tokio::time::Instant;

const GRACE: Duration = Duration::from_millis(1500);

#[tokio::test(start_paused = true)]
async fn test_registrar_answer_exits_before_grace() {
    let (softphone, _stack, mut commands) = softphone();
    let started = Instant::now();

    softphone.on_window_close_intent().await;
    assert!(softphone.is_closing().await);
    assert_eq!(next_command(&mut commands).await, Recorded::Unregister(account()));

    softphone.on_register_success(&registrar_ok()).await;

    assert_eq!(softphone.wait_for_exit().await, ExitReason::RegistrationSettled);
    assert!(started.elapsed() < GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_registrar_failure_also_exits_early() {
    let (softphone, _stack, mut commands) = softphone();
    let started = Instant::now();

    softphone.on_window_close_intent().await;
    next_command(&mut commands).await;
    softphone.on_register_failed(&rvoip_softphone_core::SipResponse::new(503, "Service Unavailable")).await;

    assert_eq!(softphone.wait_for_exit().await, ExitReason::RegistrationSettled);
    assert!(started.elapsed() < GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_silence_exits_at_grace_deadline() {
    let (softphone, _stack, _commands) = softphone();
    let started = Instant::now();

    softphone.on_window_close_intent().await;
    assert_eq!(softphone.grace_deadline().await, Some(started + GRACE));

    assert_eq!(softphone.wait_for_exit().await, ExitReason::GraceTimeout);
    assert!(started.elapsed() >= GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_exit_is_announced_once() {
    let (softphone, _stack, _commands) = softphone();
    let mut events = softphone.subscribe_events();

    softphone.on_window_close_intent().await;
    softphone.on_register_success(&registrar_ok()).await;
    softphone.wait_for_exit().await;

    // Let the aborted timer's deadline pass
    tokio::time::sleep(GRACE * 2).await;

    let terminating: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, SoftphoneEvent::Terminating { .. }))
        .collect();
    assert_eq!(terminating, vec![SoftphoneEvent::Terminating { reason: ExitReason::RegistrationSettled }]);
    assert_eq!(softphone.exit_reason(), Some(ExitReason::RegistrationSettled));
}

#[tokio::test(start_paused = true)]
async fn test_window_close_is_idempotent() {
    let (softphone, _stack, mut commands) = softphone();
    let started = Instant::now();

    softphone.on_window_close_intent().await;
    let deadline = softphone.grace_deadline().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    softphone.on_menu_action(MenuAction::Exit).await;

    assert_eq!(softphone.grace_deadline().await, deadline);
    assert_eq!(next_command(&mut commands).await, Recorded::Unregister(account()));
    assert_no_command(&mut commands).await;

    assert_eq!(softphone.wait_for_exit().await, ExitReason::GraceTimeout);
    assert!(started.elapsed() >= GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_unregister_failure_keeps_timeline() {
    let (softphone, stack, _commands) = softphone();
    stack.fail("unregister");
    let started = Instant::now();

    softphone.on_window_close_intent().await;

    assert_eq!(softphone.wait_for_exit().await, ExitReason::GraceTimeout);
    assert!(started.elapsed() >= GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_new_work_refused_while_closing() {
    let (softphone, _stack, _commands) = softphone();
    softphone.on_window_close_intent().await;

    assert_eq!(
        softphone.on_user_call_intent("sip:bob@example.com").await.unwrap_err(),
        SoftphoneError::ShuttingDown
    );
    assert_eq!(
        softphone.apply_account(AccountForm::new("a", "b", "c")).await.unwrap_err(),
        SoftphoneError::ShuttingDown
    );
    assert_eq!(softphone.start().await.unwrap_err(), SoftphoneError::ShuttingDown);
}

fn new_account_form() -> AccountForm {
    AccountForm::new("alice", "new.example.com", "new-secret")
}

#[tokio::test(start_paused = true)]
async fn test_apply_in_flight_delays_exit_until_cycle_completes() {
    let (softphone, _stack, mut commands) = softphone();
    let started = Instant::now();

    softphone.apply_account(new_account_form()).await.unwrap();
    assert_eq!(next_command(&mut commands).await, Recorded::Unregister(account()));
    softphone.on_window_close_intent().await;
    assert_eq!(next_command(&mut commands).await, Recorded::Unregister(account()));

    // First answer commits and registers the new account; still mid-cycle
    softphone.on_register_success(&registrar_ok()).await;
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Registering);
    assert_eq!(softphone.exit_reason(), None);
    assert!(matches!(
        next_command(&mut commands).await,
        Recorded::Register(credentials) if credentials.domain == "new.example.com"
    ));

    softphone.on_register_success(&registrar_ok()).await;
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
    assert_eq!(softphone.wait_for_exit().await, ExitReason::RegistrationSettled);
    assert!(started.elapsed() < GRACE);
    assert_eq!(softphone.last_registration_outcome().await, Some(RegistrationPhase::Done));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_unregister_failure_ends_apply_cycle() {
    let (softphone, stack, mut commands) = softphone();
    let mut events = softphone.subscribe_events();

    softphone.apply_account(new_account_form()).await.unwrap();
    next_command(&mut commands).await;
    stack.fail("unregister");
    softphone.on_window_close_intent().await;

    assert_eq!(softphone.wait_for_exit().await, ExitReason::GraceTimeout);
    let emitted = drain_events(&mut events);
    assert!(emitted.iter().any(|event| matches!(
        event,
        SoftphoneEvent::RegistrationFailed { phase: RegistrationPhase::Unregistering, note, .. } if note == "Unregister failed"
    )));
    assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
    assert_eq!(softphone.active_credentials().await, Some(account()));
}
