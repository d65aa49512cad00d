//! Field-level mapping between domain values and remote documents.

use buds_core::Rollup;
use buds_core::model::{
    AnalyticsSample, ChildId, ChildProfile, ModuleId, ModuleKind, ParentId, ProgressStatus,
    ProgressSummary, RemoteAnalytics, Score, WordBuilderBreakdown,
};
use serde_json::Value;
use storage::remote::{Document, DocumentWrite};
use tracing::debug;

pub const PARENT_ID: &str = "parentId";
pub const CHILD_ID: &str = "childId";
pub const MODULE_ID: &str = "moduleId";

fn u32_field(doc: &Document, field: &str) -> u32 {
    doc.get_u64(field)
        .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Merge write for a session summary. Running counters become increments.
pub fn summary_write(summary: &ProgressSummary) -> DocumentWrite {
    let mut write = DocumentWrite::new()
        .set(PARENT_ID, summary.parent_id.as_str())
        .set(CHILD_ID, summary.child_id.as_str())
        .set(MODULE_ID, summary.module.as_str())
        .set("type", summary.kind.as_str())
        .set("score", summary.score.value())
        .set("status", summary.status.as_str())
        .set(
            "completionStatus",
            summary.completion_flag || summary.score.meets_completion(),
        )
        .set("stars", summary.stars)
        .set("timeSpent", summary.time_spent_ms)
        .set("timestamp", summary.updated_at_ms)
        .set("lastUpdated", summary.updated_at_ms);

    if summary.kind == ModuleKind::Game && summary.attempts() > 0 {
        write = write
            .set("correct", summary.correct)
            .set("incorrect", summary.incorrect);
    }
    if let Some(wb) = summary.word_builder {
        write = write
            .set("wbParentCorrect", wb.parent_correct)
            .set("wbParentAttempts", wb.parent_attempts)
            .set("wbDefaultCorrect", wb.default_correct)
            .set("wbDefaultAttempts", wb.default_attempts);
    }
    if summary.plays > 0 {
        write = write.increment("plays", i64::from(summary.plays));
    }
    if summary.total_time_ms > 0 {
        write = write.increment(
            "totalTimeMs",
            i64::try_from(summary.total_time_ms).unwrap_or(i64::MAX),
        );
    }
    write
}

/// Reads a progress document back into a summary.
///
/// Returns `None` for documents with missing ids or a module this build does not know.
pub fn summary_from_document(doc: &Document) -> Option<ProgressSummary> {
    let parent = ParentId::new(doc.get_str(PARENT_ID)?).ok()?;
    let child = ChildId::new(doc.get_str(CHILD_ID)?).ok()?;
    let module: ModuleId = match doc.get_str(MODULE_ID)?.parse() {
        Ok(module) => module,
        Err(err) => {
            debug!(doc = %doc.id, %err, "skipping progress document");
            return None;
        }
    };
    let updated = doc
        .get_i64("lastUpdated")
        .or_else(|| doc.get_i64("timestamp"))
        .unwrap_or(0);

    let mut summary = ProgressSummary::new(parent, child, module, updated);
    summary.score = Score::from_i64(doc.get_i64("score").unwrap_or(0));
    summary.status = doc
        .get_str("status")
        .map_or(ProgressStatus::InProgress, ProgressStatus::parse_lenient);
    summary.completion_flag = doc.get_bool("completionStatus").unwrap_or(false);
    summary.stars = u32_field(doc, "stars");
    summary.plays = u32_field(doc, "plays");
    summary.time_spent_ms = doc.get_u64("timeSpent").unwrap_or(0);
    summary.total_time_ms = doc.get_u64("totalTimeMs").unwrap_or(0);
    summary.correct = u32_field(doc, "correct");
    summary.incorrect = u32_field(doc, "incorrect");
    if doc.get("wbParentAttempts").is_some() || doc.get("wbDefaultAttempts").is_some() {
        summary.word_builder = Some(WordBuilderBreakdown {
            parent_correct: u32_field(doc, "wbParentCorrect"),
            parent_attempts: u32_field(doc, "wbParentAttempts"),
            default_correct: u32_field(doc, "wbDefaultCorrect"),
            default_attempts: u32_field(doc, "wbDefaultAttempts"),
        });
    }
    Some(summary)
}

pub fn analytics_sample(doc: &Document) -> AnalyticsSample {
    AnalyticsSample {
        score: doc.get_u64("score"),
        correct: doc.get_u64("correct"),
        incorrect: doc.get_u64("incorrect"),
        time_spent_ms: doc.get_u64("timeSpent"),
    }
}

/// Replace write for a `child_analytics` document.
pub fn analytics_write(child: &ChildId, module: ModuleId, analytics: &RemoteAnalytics, now_ms: i64) -> DocumentWrite {
    let mut write = DocumentWrite::new()
        .set(CHILD_ID, child.as_str())
        .set(MODULE_ID, module.as_str());
    if let Ok(Value::Object(fields)) = serde_json::to_value(analytics) {
        for (field, value) in fields {
            write = write.set(field, value);
        }
    }
    write.set("lastUpdated", now_ms)
}

pub fn rollup_write(rollup: &Rollup, now_ms: i64) -> DocumentWrite {
    DocumentWrite::new()
        .set("progress", rollup.progress_percent)
        .set("stars", rollup.stars)
        .set("completedModules", rollup.completed_modules)
        .set("rollupUpdatedAt", now_ms)
}

/// Merge write for a child profile. Rollup fields are owned by the rollup and left out.
pub fn profile_write(profile: &ChildProfile) -> DocumentWrite {
    let gender = profile.gender.clone().map_or(Value::Null, Value::from);
    let level = profile.learning_level.clone().map_or(Value::Null, Value::from);
    DocumentWrite::new()
        .set(CHILD_ID, profile.child_id.as_str())
        .set(PARENT_ID, profile.parent_id.as_str())
        .set("slot", profile.slot)
        .set("name", profile.name.as_str())
        .set("age", profile.age)
        .set("gender", gender)
        .set("learningLevel", level)
        .set("avatar", profile.avatar.as_str())
        .set("words", profile.words.clone())
        .set("active", profile.active)
        .set("lastUpdated", profile.updated_at_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::remote::WriteMode;

    fn summary() -> ProgressSummary {
        let mut s = ProgressSummary::new(
            ParentId::new("p1").unwrap(),
            ChildId::new("kid").unwrap(),
            ModuleId::WordBuilder,
            1_000,
        );
        s.score = Score::new(80);
        s.status = ProgressStatus::Completed;
        s.completion_flag = true;
        s.stars = 2;
        s.plays = 1;
        s.time_spent_ms = 45_000;
        s.total_time_ms = 45_000;
        s.correct = 8;
        s.incorrect = 2;
        s.word_builder = Some(WordBuilderBreakdown {
            parent_correct: 3,
            parent_attempts: 4,
            default_correct: 5,
            default_attempts: 6,
        });
        s
    }

    #[test]
    fn summary_survives_a_write_and_read() {
        let mut doc = Document {
            id: "kid_word_builder".into(),
            ..Document::default()
        };
        summary_write(&summary()).apply_to(&mut doc.fields, WriteMode::Merge);
        let back = summary_from_document(&doc).unwrap();
        assert_eq!(back, summary());
    }

    #[test]
    fn counters_are_increments_and_zero_counters_are_omitted() {
        let write = summary_write(&summary());
        let increments: Vec<_> = write
            .ops()
            .filter(|(_, op)| matches!(op, storage::remote::FieldOp::Increment(_)))
            .map(|(field, _)| field)
            .collect();
        assert_eq!(increments, vec!["plays", "totalTimeMs"]);

        let mut quiet = summary();
        quiet.plays = 0;
        quiet.total_time_ms = 0;
        assert!(summary_write(&quiet)
            .ops()
            .all(|(_, op)| !matches!(op, storage::remote::FieldOp::Increment(_))));
    }

    #[test]
    fn unknown_modules_are_skipped() {
        let mut doc = Document::default();
        DocumentWrite::new()
            .set(PARENT_ID, "p1")
            .set(CHILD_ID, "kid")
            .set(MODULE_ID, "retired_game")
            .apply_to(&mut doc.fields, WriteMode::Merge);
        assert!(summary_from_document(&doc).is_none());
    }
}
