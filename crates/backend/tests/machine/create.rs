use crate::helpers::{NODE, TestMachine, definition, existing_record, mocks};
use pvedeploy_backend::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn create_takes_lowest_free_id_and_starts() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::list_vms(&[100, 101]).mount(&test.server).await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu"))
        .and(body_string_contains("vmid=102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
        .expect(1)
        .mount(&test.server)
        .await;
    mocks::status(102, "stopped").mount(&test.server).await;
    mocks::action(102, "start", 200)
        .expect(1)
        .mount(&test.server)
        .await;
    let mut machine = test.machine(VmRecord::new("web"));

    // Act
    let result = machine.create(&definition()).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(machine.vm_id(), Some(102));
    assert_eq!(machine.state(), LifecycleState::Starting);
    assert_eq!(machine.private_address(), Some("10.0.0.10"));
    assert!(machine.ssh_pinged());

    let stored = test.stored();
    assert_eq!(stored.vm_id, Some(102));
    assert_eq!(stored.node_name.as_deref(), Some(NODE));
    assert!(stored.client_key_pair.is_some());
}

#[tokio::test]
async fn create_waits_for_creation_task() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::list_vms(&[]).mount(&test.server).await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve/qemu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"data": "UPID:pve:00001234:0000ABCD:12345678:qmcreate:100:root@pam:"}),
        ))
        .mount(&test.server)
        .await;
    mocks::task_ok().expect(1).mount(&test.server).await;
    mocks::status(100, "stopped").mount(&test.server).await;
    mocks::action(100, "start", 200).mount(&test.server).await;
    let mut machine = test.machine(VmRecord::new("web"));

    // Act
    let result = machine.create(&definition()).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(machine.vm_id(), Some(100));
}

#[tokio::test]
async fn create_with_existing_vm_makes_no_calls() {
    // Arrange
    let test = TestMachine::new().await;
    let record = existing_record(77);
    let before = serde_json::to_value(&record).unwrap();
    let mut machine = test.machine(record);

    // Act
    let result = machine.create(&definition()).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(test.request_count().await, 0);
    assert_eq!(serde_json::to_value(machine.record()).unwrap(), before);
}

#[tokio::test]
async fn failed_create_does_not_record_vm_id() {
    // Arrange
    let test = TestMachine::new().await;
    mocks::list_vms(&[100]).mount(&test.server).await;
    mocks::create(500).mount(&test.server).await;
    mocks::action(101, "start", 200)
        .expect(0)
        .mount(&test.server)
        .await;
    let mut machine = test.machine(VmRecord::new("web"));

    // Act
    let result = machine.create(&definition()).await;

    // Assert
    assert!(matches!(
        result,
        Err(Error::Proxmox(ProxmoxError::Create, _, _))
    ));
    assert_eq!(machine.vm_id(), None);
    let stored = test.stored();
    assert_eq!(stored.vm_id, None);
    assert_eq!(stored.node_name, None);
    // The key pair survives for the next attempt.
    assert!(stored.client_key_pair.is_some());
}
