use crate::model::{Controller, ControllerActivity, ControllerPayload};
use serde_json::Value;

pub fn normalize_controllers(payload: ControllerPayload) -> Vec<Controller> {
    let raw = match payload {
        ControllerPayload::Standard(items) => standard_controllers(items),
        ControllerPayload::Job(items) => active_jobs(items),
    };

    raw.into_iter()
        .enumerate()
        .map(|(index, value)| controller_from_value(value, index))
        .collect()
}

fn standard_controllers(items: Vec<Value>) -> Vec<Value> {
    items
}

/// Running instances of the newest job definition: the `active` list of the
/// first item, read from `status.active` or a bare `active` array.
fn active_jobs(items: Vec<Value>) -> Vec<Value> {
    let Some(first) = items.into_iter().next() else {
        return Vec::new();
    };

    let active = first
        .pointer("/status/active")
        .filter(|value| value.is_array())
        .or_else(|| first.get("active").filter(|value| value.is_array()));

    active
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn controller_from_value(value: Value, index: usize) -> Controller {
    let kind = string_at(&value, &["/kind"]).unwrap_or_else(|| "Unknown".to_string());
    let name = string_at(&value, &["/metadata/name", "/name"]).unwrap_or_else(|| "-".to_string());
    // object references spawned by a CronJob carry uid at the top level
    let id = string_at(&value, &["/metadata/uid", "/uid"])
        .unwrap_or_else(|| format!("{kind}/{name}#{index}"));
    let activity = controller_activity(&value);

    Controller {
        id,
        name,
        kind,
        activity,
        raw_status: value,
        ordinal_index: index,
    }
}

pub fn controller_activity(value: &Value) -> ControllerActivity {
    let paused = ["/spec/paused", "/spec/suspend", "/paused"]
        .iter()
        .any(|pointer| value.pointer(pointer).and_then(Value::as_bool) == Some(true));
    if paused {
        ControllerActivity::Paused
    } else {
        ControllerActivity::Active
    }
}

fn string_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| {
        value
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_controllers;
    use crate::model::{ControllerActivity, ControllerPayload};
    use serde_json::json;

    #[test]
    fn standard_payload_is_kept_verbatim() {
        let items = vec![
            json!({"kind": "Deployment", "metadata": {"name": "web", "uid": "u-web"}}),
            json!({"kind": "Job", "metadata": {"name": "migrate", "uid": "u-mig"}}),
            json!({"kind": "Deployment", "metadata": {"name": "worker", "uid": "u-wrk"}}),
        ];
        let controllers = normalize_controllers(ControllerPayload::Standard(items.clone()));

        assert_eq!(controllers.len(), 3);
        for (index, (controller, raw)) in controllers.iter().zip(items.iter()).enumerate() {
            assert_eq!(&controller.raw_status, raw);
            assert_eq!(controller.ordinal_index, index);
        }
        assert_eq!(controllers[0].id, "u-web");
        assert_eq!(controllers[1].kind, "Job");
        assert_eq!(controllers[2].name, "worker");
    }

    #[test]
    fn job_payload_uses_active_list_of_first_item() {
        let payload = ControllerPayload::Job(vec![
            json!({"active": [
                {"kind": "Job", "name": "job-a", "uid": "a"},
                {"kind": "Job", "name": "job-b", "uid": "b"}
            ]}),
            json!({"active": [{"kind": "Job", "name": "ignored", "uid": "z"}]}),
        ]);
        let ids = normalize_controllers(payload)
            .into_iter()
            .map(|controller| controller.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn job_payload_reads_cronjob_status_active() {
        let payload = ControllerPayload::Job(vec![json!({
            "kind": "CronJob",
            "metadata": {"name": "nightly", "uid": "cj"},
            "spec": {"suspend": false},
            "status": {"active": [{"kind": "Job", "name": "nightly-2891", "uid": "j1"}]}
        })]);
        let controllers = normalize_controllers(payload);
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].id, "j1");
        assert_eq!(controllers[0].name, "nightly-2891");
    }

    #[test]
    fn job_payload_without_active_is_empty() {
        assert!(normalize_controllers(ControllerPayload::Job(vec![])).is_empty());
        assert!(normalize_controllers(ControllerPayload::Job(vec![json!({})])).is_empty());
        assert!(
            normalize_controllers(ControllerPayload::Job(vec![json!({"status": {}})])).is_empty()
        );
        assert!(
            normalize_controllers(ControllerPayload::Job(vec![json!({"active": "nope"})]))
                .is_empty()
        );
        assert!(normalize_controllers(ControllerPayload::Job(vec![json!(null)])).is_empty());
    }

    #[test]
    fn missing_identity_falls_back_to_positional_id() {
        let controllers = normalize_controllers(ControllerPayload::Standard(vec![
            json!({"kind": "Deployment"}),
            json!("not an object"),
        ]));
        assert_eq!(controllers[0].id, "Deployment/-#0");
        assert_eq!(controllers[1].id, "Unknown/-#1");
    }

    #[test]
    fn duplicate_ids_do_not_panic() {
        let controllers = normalize_controllers(ControllerPayload::Standard(vec![
            json!({"metadata": {"uid": "same"}}),
            json!({"metadata": {"uid": "same"}}),
        ]));
        assert_eq!(controllers.len(), 2);
    }

    #[test]
    fn paused_and_suspended_controllers_are_reported_paused() {
        let controllers = normalize_controllers(ControllerPayload::Standard(vec![
            json!({"kind": "Deployment", "metadata": {"uid": "d"}, "spec": {"paused": true}}),
            json!({"kind": "CronJob", "metadata": {"uid": "c"}, "spec": {"suspend": true}}),
            json!({"kind": "Deployment", "metadata": {"uid": "e"}, "spec": {"paused": false}}),
        ]));
        assert_eq!(controllers[0].activity, ControllerActivity::Paused);
        assert_eq!(controllers[1].activity, ControllerActivity::Paused);
        assert_eq!(controllers[2].activity, ControllerActivity::Active);
    }
}
