//! Conformance test suite wiring for every registered engine strategy.
//!
//! Each test function corresponds to a single conformance scenario against a
//! single strategy, providing fine-grained failure reporting. The `run_all`
//! tests exercise the full battery as a one-liner to verify no scenario is
//! accidentally omitted, and `every_strategy_is_covered` pins the registry so
//! a newly added strategy cannot ship without joining this file.

#![allow(clippy::expect_used, clippy::panic)]

use recipes_storage::{conformance, EngineStrategy};

// ============================================================================
// Memory engine
// ============================================================================

#[tokio::test]
async fn memory_save_without_id_assigns_fresh_id() {
    conformance::save_without_id_assigns_fresh_id(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_roundtrip_by_both_indices() {
    conformance::roundtrip_by_both_indices(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_save_at_unused_id_is_creation() {
    conformance::save_at_unused_id_is_creation(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_get_missing_returns_none() {
    conformance::get_missing_returns_none(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_get_by_unknown_source_returns_none() {
    conformance::get_by_unknown_source_returns_none(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_stale_version_is_silently_rejected() {
    conformance::stale_version_is_silently_rejected(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_equal_version_is_rejected() {
    conformance::equal_version_is_rejected(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_newer_version_overwrites() {
    conformance::newer_version_overwrites(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_source_index_follows_replaces() {
    conformance::source_index_follows_replaces(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_creation_emits_one_saved_event() {
    conformance::creation_emits_one_saved_event(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_deletion_emits_one_deleted_event() {
    conformance::deletion_emits_one_deleted_event(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_delete_missing_is_idempotent_noop() {
    conformance::delete_missing_is_idempotent_noop(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_delete_without_id_fails() {
    conformance::delete_without_id_fails(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_flush_clears_everything_silently() {
    conformance::flush_clears_everything_silently(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_allocation_failure_leaves_no_partial_state() {
    conformance::allocation_failure_leaves_no_partial_state(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_concurrent_saves_highest_version_wins() {
    conformance::concurrent_saves_highest_version_wins(EngineStrategy::Memory).await;
}

#[tokio::test]
async fn memory_full_lifecycle() {
    conformance::full_lifecycle(EngineStrategy::Memory).await;
}

// ============================================================================
// Journal engine
// ============================================================================

#[tokio::test]
async fn journal_save_without_id_assigns_fresh_id() {
    conformance::save_without_id_assigns_fresh_id(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_roundtrip_by_both_indices() {
    conformance::roundtrip_by_both_indices(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_save_at_unused_id_is_creation() {
    conformance::save_at_unused_id_is_creation(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_get_missing_returns_none() {
    conformance::get_missing_returns_none(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_get_by_unknown_source_returns_none() {
    conformance::get_by_unknown_source_returns_none(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_stale_version_is_silently_rejected() {
    conformance::stale_version_is_silently_rejected(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_equal_version_is_rejected() {
    conformance::equal_version_is_rejected(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_newer_version_overwrites() {
    conformance::newer_version_overwrites(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_source_index_follows_replaces() {
    conformance::source_index_follows_replaces(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_creation_emits_one_saved_event() {
    conformance::creation_emits_one_saved_event(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_deletion_emits_one_deleted_event() {
    conformance::deletion_emits_one_deleted_event(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_delete_missing_is_idempotent_noop() {
    conformance::delete_missing_is_idempotent_noop(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_delete_without_id_fails() {
    conformance::delete_without_id_fails(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_flush_clears_everything_silently() {
    conformance::flush_clears_everything_silently(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_allocation_failure_leaves_no_partial_state() {
    conformance::allocation_failure_leaves_no_partial_state(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_concurrent_saves_highest_version_wins() {
    conformance::concurrent_saves_highest_version_wins(EngineStrategy::Journal).await;
}

#[tokio::test]
async fn journal_full_lifecycle() {
    conformance::full_lifecycle(EngineStrategy::Journal).await;
}

// ============================================================================
// Concurrency under a multi-thread runtime
// ============================================================================
//
// The ordering assertion in `concurrent_saves_highest_version_wins` (event
// versions strictly increasing) only bites when writers actually race, which
// a current-thread runtime never produces. Run the scenario repeatedly on a
// multi-thread runtime so commit/publish inversions surface.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_event_order_matches_commit_order_across_threads() {
    for _ in 0..64 {
        conformance::concurrent_saves_highest_version_wins(EngineStrategy::Memory).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn journal_event_order_matches_commit_order_across_threads() {
    for _ in 0..64 {
        conformance::concurrent_saves_highest_version_wins(EngineStrategy::Journal).await;
    }
}

// ============================================================================
// Full battery convenience runners
// ============================================================================

/// Runs every scenario in sequence per strategy. This catches the case where
/// a new scenario is added to the conformance module but not wired into the
/// individual test functions above.
#[tokio::test]
async fn run_all_against_every_strategy() {
    for strategy in EngineStrategy::all() {
        conformance::run_all(*strategy).await;
    }
}

/// Pins the strategy registry. Adding a strategy without extending this file
/// (and the battery above) fails here.
#[test]
fn every_strategy_is_covered() {
    assert_eq!(
        EngineStrategy::all(),
        &[EngineStrategy::Memory, EngineStrategy::Journal],
        "new strategies must be wired into the conformance tests"
    );
}
