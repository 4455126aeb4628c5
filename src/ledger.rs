// src/ledger.rs
//
// Every mutation of a user's point balance or a reward's stock goes
// through this module. Each write is a single conditional update whose
// filter carries the invariant (balance >= amount, stock > 0), so a
// balance can never go negative and two racing redeemers of the last
// stock unit resolve to exactly one winner.

use mongodb::bson::{doc, Document};
use mongodb::Database;
use rand::Rng;
use thiserror::Error;

use crate::report::ReportStatus;
use crate::store;

/// Points paid per recycling stage. A report completes two stages
/// (collected, processed) for 100 points total.
pub const STAGE_AWARD: i64 = 50;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient points")]
    InsufficientPoints,
    #[error("Reward is out of stock")]
    OutOfStock,
    #[error("User not found")]
    UnknownUser,
    #[error("Reward not found")]
    UnknownReward,
    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

/// The stages a report arriving at `target` is paid for. Moving to
/// `processed` covers both stages, so a report that skipped `collected`
/// still ends up at 100 points, not 150.
pub fn stage_names(target: ReportStatus) -> &'static [&'static str] {
    match target {
        ReportStatus::Pending => &[],
        ReportStatus::Collected => &["collected"],
        ReportStatus::Processed => &["collected", "processed"],
    }
}

/// Point delta for a report arriving at `target`, given the stages it
/// has already been paid for. Stages are paid at most once; moving
/// backwards pays (and deducts) nothing.
pub fn transition_award(already_awarded: &[String], target: ReportStatus) -> i64 {
    stage_names(target)
        .iter()
        .filter(|stage| !already_awarded.iter().any(|a| a == *stage))
        .count() as i64
        * STAGE_AWARD
}

/// score = round(correct / total * quiz points)
pub fn quiz_score(correct_count: usize, total_questions: usize, quiz_points: i64) -> i64 {
    if total_questions == 0 {
        return 0;
    }
    ((correct_count as f64 / total_questions as f64) * quiz_points as f64).round() as i64
}

// 0/O and 1/I are left out so codes survive being read over the phone.
const COUPON_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const COUPON_GROUPS: usize = 3;
const COUPON_GROUP_LEN: usize = 4;

/// Human-readable coupon code, e.g. `K7QF-29MN-XWPD`.
pub fn coupon_code() -> String {
    let mut rng = rand::thread_rng();
    (0..COUPON_GROUPS)
        .map(|_| {
            (0..COUPON_GROUP_LEN)
                .map(|_| COUPON_CHARSET[rng.gen_range(0..COUPON_CHARSET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn debit_filter(user_id: &str, amount: i64) -> Document {
    doc! { "user_id": user_id, "points": { "$gte": amount } }
}

fn stock_filter(reward_id: &str) -> Document {
    doc! { "reward_id": reward_id, "status": "active", "stock": { "$gt": 0_i64 } }
}

/// Add points to a user's balance.
pub async fn credit(db: &Database, user_id: &str, amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Ok(());
    }
    let users = db.collection::<Document>(store::USERS);
    let result = users
        .update_one(doc! { "user_id": user_id }, doc! { "$inc": { "points": amount } })
        .await?;
    if result.matched_count == 0 {
        return Err(LedgerError::UnknownUser);
    }
    Ok(())
}

/// Remove points from a user's balance, refusing to overdraw. The
/// balance check and the decrement are one write, so concurrent debits
/// of the same balance cannot take it below zero.
pub async fn debit(db: &Database, user_id: &str, amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Ok(());
    }
    let users = db.collection::<Document>(store::USERS);
    let result = users
        .update_one(debit_filter(user_id, amount), doc! { "$inc": { "points": -amount } })
        .await?;
    if result.matched_count == 1 {
        return Ok(());
    }
    match users.find_one(doc! { "user_id": user_id }).await? {
        Some(_) => Err(LedgerError::InsufficientPoints),
        None => Err(LedgerError::UnknownUser),
    }
}

/// Take one unit of stock from an active reward. When two redeemers
/// race for the last unit, exactly one write matches.
pub async fn take_stock_unit(db: &Database, reward_id: &str) -> Result<(), LedgerError> {
    let rewards = db.collection::<Document>(store::REWARDS);
    let result = rewards
        .update_one(stock_filter(reward_id), doc! { "$inc": { "stock": -1_i64 } })
        .await?;
    if result.matched_count == 1 {
        return Ok(());
    }
    match rewards.find_one(doc! { "reward_id": reward_id }).await? {
        Some(_) => Err(LedgerError::OutOfStock),
        None => Err(LedgerError::UnknownReward),
    }
}

/// Put a unit of stock back after a downstream redemption step failed.
pub async fn release_stock_unit(db: &Database, reward_id: &str) -> Result<(), LedgerError> {
    let rewards = db.collection::<Document>(store::REWARDS);
    let result = rewards
        .update_one(doc! { "reward_id": reward_id }, doc! { "$inc": { "stock": 1_i64 } })
        .await?;
    if result.matched_count == 0 {
        return Err(LedgerError::UnknownReward);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn collection_pays_fifty_once() {
        assert_eq!(transition_award(&[], ReportStatus::Collected), 50);
        assert_eq!(transition_award(&stages(&["collected"]), ReportStatus::Collected), 0);
    }

    #[test]
    fn skipping_collection_pays_full_hundred() {
        assert_eq!(transition_award(&[], ReportStatus::Processed), 100);
    }

    #[test]
    fn processing_after_collection_pays_the_remainder() {
        assert_eq!(transition_award(&stages(&["collected"]), ReportStatus::Processed), 50);
        assert_eq!(
            transition_award(&stages(&["collected", "processed"]), ReportStatus::Processed),
            0
        );
    }

    #[test]
    fn moving_backwards_never_deducts() {
        assert_eq!(transition_award(&stages(&["collected", "processed"]), ReportStatus::Pending), 0);
        assert_eq!(transition_award(&stages(&["collected", "processed"]), ReportStatus::Collected), 0);
    }

    #[test]
    fn corrected_report_is_not_paid_twice() {
        // collected -> pending (correction) -> collected again
        let paid = stages(&["collected"]);
        assert_eq!(transition_award(&paid, ReportStatus::Pending), 0);
        assert_eq!(transition_award(&paid, ReportStatus::Collected), 0);
    }

    #[test]
    fn quiz_score_rounds_to_nearest() {
        assert_eq!(quiz_score(1, 3, 100), 33);
        assert_eq!(quiz_score(2, 3, 100), 67);
        assert_eq!(quiz_score(1, 2, 25), 13);
    }

    #[test]
    fn quiz_score_stays_within_bounds() {
        for total in 1..=10usize {
            for correct in 0..=total {
                let score = quiz_score(correct, total, 80);
                assert!((0..=80).contains(&score), "score {} out of range", score);
            }
        }
        assert_eq!(quiz_score(0, 5, 100), 0);
        assert_eq!(quiz_score(5, 5, 100), 100);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        assert_eq!(quiz_score(0, 0, 100), 0);
    }

    #[test]
    fn debit_guard_carries_the_balance_check() {
        let filter = debit_filter("u-1", 300);
        assert_eq!(filter.get_str("user_id").unwrap(), "u-1");
        let guard = filter.get_document("points").unwrap();
        assert_eq!(guard.get_i64("$gte").unwrap(), 300);
    }

    #[test]
    fn stock_guard_requires_an_active_reward_with_stock() {
        let filter = stock_filter("r-1");
        assert_eq!(filter.get_str("reward_id").unwrap(), "r-1");
        assert_eq!(filter.get_str("status").unwrap(), "active");
        let guard = filter.get_document("stock").unwrap();
        assert_eq!(guard.get_i64("$gt").unwrap(), 0);
    }

    #[test]
    fn coupon_codes_are_grouped_and_unambiguous() {
        for _ in 0..50 {
            let code = coupon_code();
            let groups: Vec<&str> = code.split('-').collect();
            assert_eq!(groups.len(), COUPON_GROUPS);
            for group in groups {
                assert_eq!(group.len(), COUPON_GROUP_LEN);
                assert!(group.bytes().all(|b| COUPON_CHARSET.contains(&b)));
            }
        }
    }
}
