//! Mastery evaluation.

use crate::store::{ProgressStore, StoreResult};
use crate::types::{CardId, UserId};

/// A card is mastered once every one of its questions has been answered
/// correctly at least once. Cards without questions never qualify here;
/// the scheduler masters them directly on first exposure.
pub fn is_card_mastered(total_questions: u32, correct_answers: u32) -> bool {
    total_questions > 0 && correct_answers >= total_questions
}

/// Evaluate mastery from the store's question and answer counts.
pub async fn evaluate<S: ProgressStore>(store: &S, card: CardId, user: UserId) -> StoreResult<bool> {
    let total = store.count_questions(card).await?;
    let correct = store.count_correct_answers(user, card).await?;
    Ok(is_card_mastered(total, correct))
}
