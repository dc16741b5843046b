//! Canned responses of the mocked Proxmox node.

use super::NODE;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

const UPID: &str = "UPID:pve:00001234:0000ABCD:12345678:qmstart:100:root@pam:";

pub fn list_vms(ids: &[u32]) -> Mock {
    let vms: Vec<_> = ids.iter().map(|id| json!({"vmid": id})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/{}/qemu", NODE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": vms})))
}

pub fn list_vms_error() -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/{}/qemu", NODE)))
        .respond_with(ResponseTemplate::new(500))
}

pub fn status(vm_id: u32, status: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(status_path(vm_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": status}})))
}

pub fn status_error(vm_id: u32, code: u16) -> Mock {
    Mock::given(method("GET"))
        .and(path(status_path(vm_id)))
        .respond_with(ResponseTemplate::new(code))
}

/// `start`, `shutdown` or `stop` answered with `code`.
///
pub fn action(vm_id: u32, action: &str, code: u16) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!("/api2/json/nodes/{}/qemu/{}/status/{}", NODE, vm_id, action)))
        .respond_with(upid_response(code))
}

pub fn create(code: u16) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!("/api2/json/nodes/{}/qemu", NODE)))
        .respond_with(ResponseTemplate::new(code).set_body_json(json!({"data": null})))
}

pub fn delete(vm_id: u32, code: u16) -> Mock {
    Mock::given(method("DELETE"))
        .and(path(format!("/api2/json/nodes/{}/qemu/{}", NODE, vm_id)))
        .respond_with(upid_response(code))
}

/// Any task finished successfully.
///
pub fn task_ok() -> Mock {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api2/json/nodes/pve/tasks/.+/status$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"status": "stopped", "exitstatus": "OK"}})),
        )
}

fn status_path(vm_id: u32) -> String {
    format!("/api2/json/nodes/{}/qemu/{}/status/current", NODE, vm_id)
}

fn upid_response(code: u16) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({"data": UPID}))
}
