use crate::helpers::{FakeGuest, TestMachine, existing_record, mocks};
use pvedeploy_backend::prelude::*;

#[tokio::test]
async fn check_without_vm_reports_missing() {
    // Arrange
    let test = TestMachine::new().await;
    let mut machine = test.machine(VmRecord::new("web"));

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.exists, Some(false));
    assert_eq!(test.request_count().await, 0);
}

#[tokio::test]
async fn status_error_does_not_clear_record() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 500).mount(&test.server).await;
    mocks::list_vms(&[77]).mount(&test.server).await;
    let mut record = existing_record(77);
    record.private_address = Some("10.0.0.7".to_owned());
    let mut machine = test.machine(record);

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.exists, None);
    assert_eq!(report.state, LifecycleState::Unknown);
    let stored = test.stored();
    assert_eq!(stored.vm_id, Some(77));
    assert_eq!(stored.private_address.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn unreachable_node_does_not_clear_record() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 503).mount(&test.server).await;
    mocks::list_vms_error().mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.state, LifecycleState::Unknown);
    assert_eq!(test.stored().vm_id, Some(77));
}

#[tokio::test]
async fn confirmed_absence_clears_record() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status_error(77, 500).mount(&test.server).await;
    mocks::list_vms(&[100, 101]).mount(&test.server).await;
    let mut record = existing_record(77);
    record.private_address = Some("10.0.0.7".to_owned());
    let mut machine = test.machine(record);

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.exists, Some(false));
    assert_eq!(report.state, LifecycleState::Missing);
    let stored = test.stored();
    assert_eq!(stored.vm_id, None);
    assert_eq!(stored.private_address, None);
    assert_eq!(stored.state, LifecycleState::Missing);
}

#[tokio::test]
async fn stopped_vm_is_recorded_as_stopped() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "stopped").mount(&test.server).await;
    let mut machine = test.machine(existing_record(77));

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.exists, Some(true));
    assert_eq!(report.is_up, Some(false));
    assert_eq!(test.stored().state, LifecycleState::Stopped);
}

#[tokio::test]
async fn running_vm_is_probed_for_reachability() {
    // Arrange
    let guest = FakeGuest {
        reachable: false,
        ..Default::default()
    };
    let test = TestMachine::with_guest(guest).await;
    mocks::status(77, "running").mount(&test.server).await;
    let mut record = existing_record(77);
    record.private_address = Some("10.0.0.7".to_owned());
    record.state = LifecycleState::Stopped;
    let mut machine = test.machine(record);

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.is_up, Some(true));
    assert_eq!(report.is_reachable, Some(false));
    assert_eq!(report.state, LifecycleState::Unknown);
}

#[tokio::test]
async fn unrecognized_status_is_unknown() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::status(77, "paused").mount(&test.server).await;
    let mut record = existing_record(77);
    record.state = LifecycleState::Stopped;
    let mut machine = test.machine(record);

    // Act
    let report = machine.check().await.unwrap();

    // Assert
    assert_eq!(report.state, LifecycleState::Unknown);
    assert_eq!(test.stored().vm_id, Some(77));
}
