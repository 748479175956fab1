//! Turning pending outbox entries into a digest for the chat front end.

use starbot_core::error::StoreError;

use crate::store::{ResultStatus, ResultStore};

/// Plain-text digest plus the ids to mark once it has been shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationDigest {
    pub text: String,
    pub result_ids: Vec<String>,
}

/// Summarize unreported results for `conversation_id`, grouped by task in
/// first-seen order. `None` when nothing is pending.
pub fn collect_conversation_summary(results: &ResultStore, conversation_id: &str) -> Option<ConversationDigest> {
    let pending = results.list_pending(conversation_id);
    let (first, last) = (pending.first()?, pending.last()?);

    let mut groups: Vec<(&str, usize, usize)> = Vec::new();
    for item in &pending {
        let ok = item.status == ResultStatus::Ok;
        match groups.iter_mut().find(|(task, _, _)| *task == item.task_id) {
            Some((_, oks, errors)) => {
                if ok {
                    *oks += 1;
                } else {
                    *errors += 1;
                }
            }
            None => groups.push((item.task_id.as_str(), ok as usize, (!ok) as usize)),
        }
    }

    let mut lines = vec!["Background automation activity while you were away:".to_string()];
    for (task, oks, errors) in &groups {
        lines.push(format!(
            "- Task {task}: {} new event(s) ({oks} ok, {errors} failed).",
            oks + errors
        ));
    }
    lines.push(format!(
        "Time range: {} to {}.",
        first.timestamp.to_rfc3339(),
        last.timestamp.to_rfc3339()
    ));
    lines.push("Ask for details to see each structured event.".to_string());

    Some(ConversationDigest {
        text: lines.join("\n"),
        result_ids: pending.iter().map(|r| r.id.clone()).collect(),
    })
}

/// Mark a digest's results as reported. Call only after it was displayed.
pub fn mark_digest_reported(results: &ResultStore, digest: &ConversationDigest) -> Result<usize, StoreError> {
    results.mark_reported(&digest.result_ids)
}
