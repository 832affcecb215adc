//! Fence lifecycle basics: transparent fences, pre-triggered deadlines,
//! misuse, and the rescind path where the body beats the interruption.

mod common;

use common::{init_test_logging, poll_once};
use fenceline::runtime::{cancelling, current_task, pending, Runtime};
use fenceline::time::sleep;
use fenceline::types::CancelKind;
use fenceline::{assert_with_log, test_complete, test_phase};
use fenceline::{DeadlineTrigger, Error, ErrorKind, Fence};
use std::cell::Cell;
use std::task::Poll;
use std::time::Duration;

#[test]
fn fence_without_triggers_is_transparent_async() {
    init_test_logging();
    test_phase!("fence_without_triggers_is_transparent_async");
    Runtime::new().block_on(async {
        let me = current_task().expect("in task");
        let before = cancelling(me);
        let mut fence = Fence::new();
        let out = fence
            .guard(async {
                sleep(Duration::ZERO).await?;
                Ok(())
            })
            .await;
        assert_with_log!(out == Ok(Some(())), "body completes", Ok::<Option<()>, Error>(Some(())), out);
        assert_with_log!(!fence.cancelled(), "not cancelled", false, fence.cancelled());
        assert_with_log!(
            fence.reasons().is_empty(),
            "no reasons",
            0usize,
            fence.reasons().len()
        );
        let after = cancelling(me);
        assert_with_log!(before == after, "counter balanced", before, after);
    });
    test_complete!("fence_without_triggers_is_transparent_async");
}

#[test]
fn fence_without_triggers_is_transparent_sync() {
    init_test_logging();
    test_phase!("fence_without_triggers_is_transparent_sync");
    Runtime::new().block_on(async {
        let mut fence = Fence::new();
        let out = fence.guard(async { Ok(7) }).await;
        assert_with_log!(out == Ok(Some(7)), "sync body completes", Ok::<Option<i32>, Error>(Some(7)), out);
        assert_with_log!(!fence.cancelled(), "not cancelled", false, fence.cancelled());
    });
    test_complete!("fence_without_triggers_is_transparent_sync");
}

#[test]
fn zero_deadline_interrupts_body_at_first_suspension() {
    init_test_logging();
    test_phase!("zero_deadline_interrupts_body_at_first_suspension");
    Runtime::new().block_on(async {
        let reached_before = Cell::new(false);
        let reached_after = Cell::new(false);
        let mut fence = Fence::deadline(Duration::ZERO);
        let out = fence
            .guard(async {
                reached_before.set(true);
                sleep(Duration::ZERO).await?;
                reached_after.set(true);
                Ok(())
            })
            .await;
        assert_with_log!(out == Ok(None), "interruption owned", Ok::<Option<()>, Error>(None), out);
        assert_with_log!(
            reached_before.get(),
            "body ran until its first suspension",
            true,
            reached_before.get()
        );
        assert_with_log!(
            !reached_after.get(),
            "body did not pass the suspension",
            false,
            reached_after.get()
        );
        assert_with_log!(fence.cancelled(), "cancelled", true, fence.cancelled());
    });
    test_complete!("zero_deadline_interrupts_body_at_first_suspension");
}

#[test]
fn zero_deadline_with_synchronous_body_completes_and_leaves_nothing_behind() {
    init_test_logging();
    test_phase!("zero_deadline_with_synchronous_body_completes_and_leaves_nothing_behind");
    Runtime::new().block_on(async {
        let me = current_task().expect("in task");
        let before = cancelling(me);
        let mut fence = Fence::deadline(Duration::ZERO);
        let out = fence.guard(async { Ok("ran") }).await;
        assert_with_log!(
            out == Ok(Some("ran")),
            "synchronous body completes",
            Ok::<Option<&str>, Error>(Some("ran")),
            out
        );
        assert_with_log!(fence.cancelled(), "still cancelled", true, fence.cancelled());
        let reasons = fence.reasons();
        assert_with_log!(reasons.len() == 1, "one reason", 1usize, reasons.len());
        assert_with_log!(
            reasons[0].kind() == CancelKind::Deadline,
            "deadline reason",
            CancelKind::Deadline,
            reasons[0].kind()
        );
        // No pending interruption may remain: the next suspension on
        // this task completes normally.
        sleep(Duration::from_millis(1)).await.expect("no spurious cancellation");
        let after = cancelling(me);
        assert_with_log!(before == after, "counter balanced", before, after);
    });
    test_complete!("zero_deadline_with_synchronous_body_completes_and_leaves_nothing_behind");
}

#[test]
fn fence_cannot_be_reused() {
    init_test_logging();
    test_phase!("fence_cannot_be_reused");
    Runtime::new().block_on(async {
        let mut fence = Fence::new();
        let first = fence.guard(async { Ok(()) }).await;
        assert_with_log!(first == Ok(Some(())), "first use works", Ok::<Option<()>, Error>(Some(())), first);
        let second = fence.guard(async { Ok(()) }).await;
        let err = second.expect_err("second use is a misuse error");
        assert_with_log!(
            err.kind() == ErrorKind::FenceReused,
            "reuse is reported",
            ErrorKind::FenceReused,
            err.kind()
        );
        assert_with_log!(
            err.message() == Some("fence cannot be reused"),
            "reuse message",
            Some("fence cannot be reused"),
            err.message()
        );
    });
    test_complete!("fence_cannot_be_reused");
}

#[test]
fn guarding_outside_a_task_is_a_misuse_error() {
    init_test_logging();
    test_phase!("guarding_outside_a_task_is_a_misuse_error");
    let mut fence = Fence::new();
    let mut guard = fence.guard(async { Ok(()) });
    match poll_once(&mut guard) {
        Poll::Ready(Err(err)) => {
            assert_with_log!(
                err.kind() == ErrorKind::NotInTask,
                "not-in-task reported",
                ErrorKind::NotInTask,
                err.kind()
            );
        }
        other => panic!("expected a misuse error, got {other:?}"),
    }
    test_complete!("guarding_outside_a_task_is_a_misuse_error");
}

#[test]
fn body_errors_pass_through_untouched() {
    init_test_logging();
    test_phase!("body_errors_pass_through_untouched");
    Runtime::new().block_on(async {
        let me = current_task().expect("in task");
        let before = cancelling(me);
        let mut fence = Fence::deadline(Duration::from_secs(10));
        let out: Result<Option<()>, Error> = fence
            .guard(async {
                sleep(Duration::from_millis(1)).await?;
                Err(Error::user("boom"))
            })
            .await;
        let err = out.expect_err("body error propagates");
        assert_with_log!(
            err.kind() == ErrorKind::User,
            "user error untouched",
            ErrorKind::User,
            err.kind()
        );
        assert_with_log!(!fence.cancelled(), "fence not cancelled", false, fence.cancelled());
        let after = cancelling(me);
        assert_with_log!(before == after, "counter balanced", before, after);
    });
    test_complete!("body_errors_pass_through_untouched");
}

#[test]
fn cancelled_by_matches_reason_codes() {
    init_test_logging();
    test_phase!("cancelled_by_matches_reason_codes");
    Runtime::new().block_on(async {
        let mut fence =
            Fence::new().with_trigger(DeadlineTrigger::after(Duration::ZERO).with_code("budget"));
        let out = fence.guard(async { pending::<()>().await }).await;
        assert_with_log!(out == Ok(None), "interrupted", Ok::<Option<()>, Error>(None), out);
        assert_with_log!(
            fence.cancelled_by("budget"),
            "matching code found",
            true,
            fence.cancelled_by("budget")
        );
        assert_with_log!(
            !fence.cancelled_by("other"),
            "non-matching code rejected",
            false,
            fence.cancelled_by("other")
        );
    });
    test_complete!("cancelled_by_matches_reason_codes");
}

#[test]
fn body_finishing_on_the_firing_tick_rescinds_the_interruption() {
    init_test_logging();
    test_phase!("body_finishing_on_the_firing_tick_rescinds_the_interruption");
    Runtime::new().block_on(async {
        let me = current_task().expect("in task");
        let before = cancelling(me);
        // Trigger and body deadline land on the same tick; the trigger's
        // callback runs first, but its interruption is deferred one more
        // tick — by then the body has completed and exit rescinds it.
        let mut fence = Fence::deadline(Duration::from_millis(10));
        let out = fence
            .guard(async {
                sleep(Duration::from_millis(10)).await?;
                Ok("made it")
            })
            .await;
        assert_with_log!(
            out == Ok(Some("made it")),
            "body completed",
            Ok::<Option<&str>, Error>(Some("made it")),
            out
        );
        assert_with_log!(
            fence.cancelled(),
            "reason latched even though the body won",
            true,
            fence.cancelled()
        );
        sleep(Duration::from_millis(1)).await.expect("no spurious cancellation");
        let after = cancelling(me);
        assert_with_log!(before == after, "counter balanced", before, after);
    });
    test_complete!("body_finishing_on_the_firing_tick_rescinds_the_interruption");
}
