//! Small pure helpers for reading Pod status, used by both reconcilers to
//! decide the next phase transition (§4.2, §4.3).

use k8s_openapi::api::core::v1::Pod;

/// True iff the pod's `Ready` condition is `status: "True"`.
pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// True iff the pod's phase is `Failed`.
pub fn is_failed(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Failed")
        .unwrap_or(false)
}

/// Human-readable failure reason for `status.message` (§4.2 "Failed, reason
/// from consumer status").
pub fn failure_message(pod: &Pod) -> Option<String> {
    pod.status.as_ref().and_then(|s| s.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};

    fn pod_with(phase: Option<&str>, ready: Option<bool>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                conditions: ready.map(|r| {
                    vec![PodCondition {
                        type_: "Ready".to_string(),
                        status: if r { "True" } else { "False" }.to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_without_status_is_not_ready() {
        assert!(!is_ready(&Pod::default()));
    }

    #[test]
    fn ready_condition_true_is_ready() {
        assert!(is_ready(&pod_with(Some("Running"), Some(true))));
    }

    #[test]
    fn failed_phase_is_detected() {
        assert!(is_failed(&pod_with(Some("Failed"), Some(false))));
    }
}
