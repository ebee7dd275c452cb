#![forbid(unsafe_code)]

use kapsel_core::{ManifestFilters, Update, compare_recency};

use crate::traits::LauncherSelectionPolicy;

/// Default launch selection: the most recent filter-compatible candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestLauncherPolicy;

impl LauncherSelectionPolicy for LatestLauncherPolicy {
    fn launchable_update(
        &self,
        candidates: &[Update],
        filters: Option<&ManifestFilters>,
    ) -> Option<Update> {
        candidates
            .iter()
            .filter(|u| u.matches_filters(filters))
            .max_by(|a, b| compare_recency(a, b))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use kapsel_core::{MetadataMap, MetadataValue, UpdateStatus};
    use uuid::Uuid;

    use super::*;

    fn update(id: &str, commit_ms: i64, channel: Option<&str>) -> Update {
        let mut metadata = MetadataMap::new();
        if let Some(channel) = channel {
            metadata.insert("channel".into(), MetadataValue::String(channel.into()));
        }
        Update {
            id: Uuid::parse_str(id).unwrap(),
            commit_time: DateTime::from_timestamp_millis(commit_ms).unwrap(),
            runtime_version: "1.0".into(),
            metadata,
            status: UpdateStatus::Ready,
            manifest_filters: None,
            last_accessed: DateTime::from_timestamp_millis(commit_ms).unwrap(),
            successful_launch_count: 0,
            failed_launch_count: 0,
        }
    }

    const ID_LOW: &str = "11111111-1111-4111-8111-111111111111";
    const ID_HIGH: &str = "99999999-9999-4999-8999-999999999999";
    const ID_MID: &str = "55555555-5555-4555-8555-555555555555";

    #[test]
    fn empty_candidates_yield_none() {
        let policy = LatestLauncherPolicy;
        assert!(policy.launchable_update(&[], None).is_none());
    }

    #[test]
    fn most_recent_commit_time_wins() {
        let policy = LatestLauncherPolicy;
        let picked = policy
            .launchable_update(
                &[
                    update(ID_LOW, 100, None),
                    update(ID_HIGH, 300, None),
                    update(ID_MID, 200, None),
                ],
                None,
            )
            .unwrap();
        assert_eq!(picked.id.to_string(), ID_HIGH);
    }

    #[test]
    fn equal_commit_times_pick_larger_uuid_string() {
        let policy = LatestLauncherPolicy;
        let picked = policy
            .launchable_update(
                &[update(ID_HIGH, 100, None), update(ID_LOW, 100, None)],
                None,
            )
            .unwrap();
        // Smaller UUID string is "older", so the larger one is selected.
        assert_eq!(picked.id.to_string(), ID_HIGH);
    }

    #[test]
    fn selection_is_idempotent() {
        let policy = LatestLauncherPolicy;
        let candidates = vec![
            update(ID_LOW, 100, None),
            update(ID_MID, 100, None),
            update(ID_HIGH, 50, None),
        ];
        let first = policy.launchable_update(&candidates, None).unwrap();
        let second = policy.launchable_update(&candidates, None).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn incompatible_candidates_are_filtered_out() {
        let policy = LatestLauncherPolicy;
        let filters: ManifestFilters =
            [("channel".to_string(), MetadataValue::String("stable".into()))]
                .into_iter()
                .collect();

        let picked = policy
            .launchable_update(
                &[
                    update(ID_HIGH, 300, Some("beta")),
                    update(ID_LOW, 100, Some("stable")),
                ],
                Some(&filters),
            )
            .unwrap();
        assert_eq!(picked.id.to_string(), ID_LOW);

        let none = policy.launchable_update(&[update(ID_HIGH, 300, Some("beta"))], Some(&filters));
        assert!(none.is_none());
    }
}
