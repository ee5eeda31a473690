// ABOUTME: Two-reader plus adjudicator consensus fold over reader annotations
// ABOUTME: Pure function of the newest annotation per role and the agreement tolerance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use cpet_core::models::{Annotation, ConsensusRecord, ConsensusStatus, ReaderRole};
use std::collections::BTreeMap;

/// Newest annotation per role; on equal creation times the later entry wins
#[must_use]
pub fn latest_by_role(annotations: &[Annotation]) -> BTreeMap<ReaderRole, &Annotation> {
    let mut latest: BTreeMap<ReaderRole, &Annotation> = BTreeMap::new();
    for annotation in annotations {
        let newer = match latest.get(&annotation.role) {
            Some(current) => annotation.created_at >= current.created_at,
            None => true,
        };
        if newer {
            latest.insert(annotation.role, annotation);
        }
    }
    latest
}

/// Fold an exam's annotations into its consensus record
///
/// An adjudicator time always wins. Otherwise two primary times within
/// `delta` seconds resolve to their mean, and anything else leaves the
/// ground truth unset.
#[must_use]
pub fn resolve(exam_id: &str, annotations: &[Annotation], delta: f64) -> ConsensusRecord {
    let latest = latest_by_role(annotations);
    let time_of = |role| latest.get(&role).map(|a| a.crossing_time);

    let t_a = time_of(ReaderRole::A);
    let t_b = time_of(ReaderRole::B);
    let t_adjudicator = time_of(ReaderRole::Adjudicator);

    let (status, ground_truth) = match (t_adjudicator, t_a, t_b) {
        (Some(t_c), _, _) => (ConsensusStatus::Finalized, Some(t_c)),
        (None, Some(a), Some(b)) if (a - b).abs() <= delta => {
            (ConsensusStatus::Concordant, Some((a + b) / 2.0))
        }
        (None, Some(_), Some(_)) => (ConsensusStatus::Discordant, None),
        (None, Some(_), None) | (None, None, Some(_)) => (ConsensusStatus::Partial, None),
        (None, None, None) => (ConsensusStatus::Pending, None),
    };

    ConsensusRecord {
        exam_id: exam_id.to_owned(),
        delta,
        status,
        t_a,
        t_b,
        t_adjudicator,
        ground_truth,
        updated_at: latest.values().map(|a| a.created_at).max(),
    }
}
