//! Capabilities as a deduplicated set (Design Note 5): union is the only
//! mutation, and drops from the user's securityContext are ignored because
//! they would break the wrapper.

use k8s_openapi::api::core::v1::Capabilities;
use log::warn;

/// Merges `add` into the user's capability `add` list, deduplicated, and
/// discards any `drop` the user supplied.
pub fn merge_capabilities(user: &Capabilities, add: &[&str]) -> Capabilities {
    let mut merged: Vec<String> = user.add.clone().unwrap_or_default();
    for cap in add {
        if !merged.iter().any(|existing| existing == cap) {
            merged.push(cap.to_string());
        }
    }

    if let Some(drops) = &user.drop {
        if !drops.is_empty() {
            warn!(
                "merge_capabilities - ignoring user-supplied capability drops {:?}, the wrapper requires them",
                drops
            );
        }
    }

    Capabilities {
        add: Some(merged),
        drop: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_required_capability_once() {
        let user = Capabilities {
            add: Some(vec!["NET_BIND_SERVICE".to_string()]),
            drop: None,
        };
        let merged = merge_capabilities(&user, &["SYS_CHROOT"]);
        assert_eq!(
            merged.add,
            Some(vec!["NET_BIND_SERVICE".to_string(), "SYS_CHROOT".to_string()])
        );
    }

    #[test]
    fn does_not_duplicate_already_present_capability() {
        let user = Capabilities {
            add: Some(vec!["SYS_CHROOT".to_string()]),
            drop: None,
        };
        let merged = merge_capabilities(&user, &["SYS_CHROOT"]);
        assert_eq!(merged.add, Some(vec!["SYS_CHROOT".to_string()]));
    }

    #[test]
    fn drops_capability_drops() {
        let user = Capabilities {
            add: None,
            drop: Some(vec!["ALL".to_string()]),
        };
        let merged = merge_capabilities(&user, &["SYS_CHROOT"]);
        assert_eq!(merged.drop, None);
    }
}
