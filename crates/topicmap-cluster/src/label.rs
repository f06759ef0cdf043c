use std::collections::BTreeMap;
use tracing::{info, warn};

use topicmap_core::error::Error;
use topicmap_core::traits::{Labeler, MetadataProvider};
use topicmap_core::types::{ClusterLabelMap, NOISE_CLUSTER};

pub const NOISE_LABEL: &str = "Noise";
pub const UNLABELED: &str = "Unlabeled";
pub const UNKNOWN: &str = "Unknown";

const MAX_SNIPPETS: usize = 25;
const SNIPPET_CHARS: usize = 200;

pub fn truncate_chars(s: &str, max: usize) -> String { s.chars().take(max).collect() }

/// Up to 25 one-line descriptions per non-noise cluster: the member's summary when the
/// metadata collaborator has one, its id otherwise.
pub fn snippets(members: &BTreeMap<i32, Vec<String>>, metadata: Option<&dyn MetadataProvider>) -> BTreeMap<i32, Vec<String>> {
    members
        .iter()
        .filter(|&(&cid, _)| cid != NOISE_CLUSTER)
        .map(|(&cid, ids)| {
            let lines = ids
                .iter()
                .take(MAX_SNIPPETS)
                .map(|id| {
                    let summary = metadata.and_then(|m| m.get_summary(id)).filter(|s| !s.trim().is_empty());
                    let line = summary.unwrap_or_else(|| id.clone()).replace(['\n', '\r'], " ");
                    truncate_chars(line.trim(), SNIPPET_CHARS)
                })
                .collect();
            (cid, lines)
        })
        .collect()
}

pub fn label_prompt(snippets: &[String]) -> String {
    let listing = snippets.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
    format!(
        "The following items were grouped together by similarity.\n{listing}\n\n\
         Reply with a single descriptive label of 2 to 6 words for this group. Reply with the label only."
    )
}

fn clean_label(raw: &str) -> Option<String> {
    let label = raw.lines().next().unwrap_or("").trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// One labeling call per non-noise cluster. A failed or empty answer becomes `"Unlabeled"`
/// for that cluster only. Once the spend guard declines a call, no further calls are made
/// and every remaining cluster is `"Unlabeled"`.
pub fn label_clusters(snippets: &BTreeMap<i32, Vec<String>>, labeler: &dyn Labeler) -> ClusterLabelMap {
    let mut labels = ClusterLabelMap::new();
    let mut budget_spent = false;
    for (&cid, lines) in snippets.iter().filter(|&(&cid, _)| cid != NOISE_CLUSTER) {
        if budget_spent {
            labels.insert(cid, UNLABELED.to_string());
            continue;
        }
        let label = match labeler.label(&label_prompt(lines)) {
            Ok(raw) => clean_label(&raw).unwrap_or_else(|| {
                warn!(cluster = cid, "empty label returned");
                UNLABELED.to_string()
            }),
            Err(Error::BudgetExceeded { estimated }) => {
                warn!(cluster = cid, estimated, "labeling budget exhausted; skipping remaining clusters");
                budget_spent = true;
                UNLABELED.to_string()
            }
            Err(e) => {
                warn!(cluster = cid, error = %e, "labeling failed");
                UNLABELED.to_string()
            }
        };
        info!(cluster = cid, %label, "labeled cluster");
        labels.insert(cid, label);
    }
    labels
}

/// `"Noise"` for the noise id, `"Unlabeled"` when no label was produced.
pub fn resolve<'a>(labels: &'a ClusterLabelMap, cluster_id: i32) -> &'a str {
    if cluster_id == NOISE_CLUSTER { return NOISE_LABEL; }
    labels.get(&cluster_id).map_or(UNLABELED, String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topicmap_core::error::Result;
    use topicmap_core::traits::MemberMetadata;

    struct Flaky;
    impl Labeler for Flaky {
        fn label(&self, prompt: &str) -> Result<String> {
            if prompt.contains("broken") { Err(Error::Provider { status: Some(500), message: "down".into() }) } else { Ok("  \"Water Storage\"  ".into()) }
        }
    }

    /// Approves `allowed` calls, then declines like an exhausted spend guard.
    struct Capped { allowed: usize, calls: std::sync::Mutex<usize> }
    impl Labeler for Capped {
        fn label(&self, _prompt: &str) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls > self.allowed { Err(Error::BudgetExceeded { estimated: 0.01 }) } else { Ok(format!("Topic {calls}")) }
        }
    }

    struct Meta;
    impl MetadataProvider for Meta {
        fn get(&self, id: &str) -> Option<MemberMetadata> {
            (id == "a").then(|| MemberMetadata { summary: Some("x".repeat(500)), ..MemberMetadata::default() })
        }
    }

    #[test]
    fn failures_degrade_per_cluster() {
        let mut s = BTreeMap::new();
        s.insert(0, vec!["rain barrels".to_string()]);
        s.insert(1, vec!["broken".to_string()]);
        s.insert(NOISE_CLUSTER, vec!["ignored".to_string()]);
        let labels = label_clusters(&s, &Flaky);
        assert_eq!(labels.get(&0).map(String::as_str), Some("Water Storage"));
        assert_eq!(labels.get(&1).map(String::as_str), Some(UNLABELED));
        assert!(!labels.contains_key(&NOISE_CLUSTER));
    }

    #[test]
    fn exhausted_budget_stops_further_calls() {
        let s: BTreeMap<i32, Vec<String>> = (0..5).map(|c| (c, vec![format!("member {c}")])).collect();
        let labeler = Capped { allowed: 2, calls: std::sync::Mutex::new(0) };
        let labels = label_clusters(&s, &labeler);
        assert_eq!(*labeler.calls.lock().unwrap(), 3);
        assert_eq!(labels.len(), 5);
        assert_eq!(labels[&0], "Topic 1");
        assert_eq!(labels[&1], "Topic 2");
        assert!((2..5).all(|c| labels[&c] == UNLABELED));
    }

    #[test]
    fn snippets_prefer_truncated_summaries() {
        let mut members = BTreeMap::new();
        members.insert(0, vec!["a".to_string(), "b".to_string()]);
        members.insert(NOISE_CLUSTER, vec!["c".to_string()]);
        let s = snippets(&members, Some(&Meta));
        assert_eq!(s[&0][0].chars().count(), 200);
        assert_eq!(s[&0][1], "b");
        assert!(!s.contains_key(&NOISE_CLUSTER));
    }

    #[test]
    fn sentinel_resolution() {
        let mut labels = ClusterLabelMap::new();
        labels.insert(0, "Tools".into());
        assert_eq!(resolve(&labels, NOISE_CLUSTER), NOISE_LABEL);
        assert_eq!(resolve(&labels, 0), "Tools");
        assert_eq!(resolve(&labels, 7), UNLABELED);
    }
}
