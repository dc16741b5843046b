use crate::helpers::{Decline, TestMachine, existing_record, mocks};
use pvedeploy_backend::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn destroy_absent_vm_twice_succeeds_both_times() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 500).mount(&test.server).await;
    mocks::list_vms(&[100]).mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let first = machine.destroy().await;
    let requests_after_first = test.request_count().await;
    let second = machine.destroy().await;

    // Assert
    assert!(first.unwrap());
    assert!(second.unwrap());
    assert_eq!(machine.vm_id(), None);
    assert_eq!(test.request_count().await, requests_after_first);
}

#[tokio::test]
async fn destroy_nonexistent_vm_only_clears_record() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 500).mount(&test.server).await;
    mocks::list_vms(&[]).mount(&test.server).await;
    mocks::action(77, "shutdown", 200).expect(0).mount(&test.server).await;
    mocks::action(77, "stop", 200).expect(0).mount(&test.server).await;
    mocks::delete(77, 200).expect(0).mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(result.unwrap());
    let stored = test.stored();
    assert_eq!(stored.vm_id, None);
    assert_eq!(stored.private_address, None);
    assert_eq!(stored.state, LifecycleState::Missing);
}

#[tokio::test]
async fn destroy_refuses_to_forget_vm_still_listed() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 500).mount(&test.server).await;
    mocks::list_vms(&[77]).mount(&test.server).await;
    mocks::delete(77, 200).expect(0).mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(matches!(result, Err(Error::NotReady(_))));
    assert_eq!(machine.vm_id(), Some(77));
}

#[tokio::test]
async fn destroy_running_vm_shuts_down_then_deletes() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "running")
        .up_to_n_times(1)
        .mount(&test.server)
        .await;
    mocks::status(77, "stopped").mount(&test.server).await;
    mocks::action(77, "shutdown", 200).expect(1).mount(&test.server).await;
    mocks::delete(77, 200).expect(1).mount(&test.server).await;
    mocks::task_ok().mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(result.unwrap());
    assert_eq!(machine.vm_id(), None);
    assert_eq!(machine.state(), LifecycleState::Missing);
    assert_eq!(test.guest.resets(), 1);
}

#[tokio::test]
async fn destroy_pulls_the_plug_when_shutdown_is_refused() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "running")
        .up_to_n_times(1)
        .mount(&test.server)
        .await;
    mocks::status(77, "stopped").mount(&test.server).await;
    mocks::action(77, "shutdown", 500).expect(1).mount(&test.server).await;
    mocks::action(77, "stop", 200).expect(1).mount(&test.server).await;
    mocks::delete(77, 200).mount(&test.server).await;
    mocks::task_ok().mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(result.unwrap());
    assert_eq!(machine.vm_id(), None);
}

#[tokio::test]
async fn failed_delete_keeps_vm_id() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "stopped").mount(&test.server).await;
    mocks::delete(77, 500).expect(1).mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(matches!(
        result,
        Err(Error::Proxmox(ProxmoxError::Delete, _, _))
    ));
    assert_eq!(machine.vm_id(), Some(77));
}

#[tokio::test]
async fn declined_destroy_touches_nothing() {
    // Arrange
    let test = TestMachine::new().await;
    let mut machine = test.machine_with_confirm(existing_record(77), Arc::new(Decline));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(!result.unwrap());
    assert_eq!(machine.vm_id(), Some(77));
    assert_eq!(test.request_count().await, 0);
}

#[tokio::test]
async fn destroy_without_vm_is_noop() {
    // Arrange
    let test = TestMachine::new().await;
    let mut machine = test.machine_with_confirm(VmRecord::new("web"), Arc::new(Decline));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(result.unwrap());
    assert_eq!(test.request_count().await, 0);
}

#[tokio::test]
async fn destroy_stopped_vm_drops_management_connection() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "stopped").mount(&test.server).await;
    mocks::action(77, "shutdown", 200).expect(0).mount(&test.server).await;
    mocks::delete(77, 200).expect(1).mount(&test.server).await;
    mocks::task_ok().mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let result = machine.destroy().await;

    // Assert
    assert!(result.unwrap());
    assert_eq!(test.guest.resets(), 1);
    assert_eq!(machine.vm_id(), None);
}
