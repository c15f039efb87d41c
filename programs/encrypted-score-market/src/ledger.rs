//! Batch lifecycle and the per-batch prediction store.

use anchor_lang::prelude::*;

use crate::access::{require_not_paused, require_provider};
use crate::errors::MarketError;
use crate::events::{BatchClosed, BatchOpened, BatchResultRecorded, PredictionSubmitted};
use crate::state::{
    ActionClass, ActorCooldowns, Batch, BatchStatus, EncryptedScore, MarketConfig, Prediction,
    RoleAssignment, MAX_PREDICTIONS_PER_BATCH,
};

/// A predictor's stake on a batch, as carried by `submit_prediction`.
#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub predictor: Pubkey,
    pub encrypted_score: EncryptedScore,
    pub amount: u64,
    /// Lamports the predictor's own transfer added to the batch vault in
    /// this call. Third-party deposits to the vault never count.
    pub attached_value: u64,
}

pub fn open_batch(
    config: &mut MarketConfig,
    actor: &Pubkey,
    assignment: Option<&RoleAssignment>,
    batch: &mut Batch,
    batch_id: u64,
    bump: u8,
    now: i64,
) -> Result<BatchOpened> {
    require_provider(config, actor, assignment)?;
    require_not_paused(config)?;
    require!(
        batch_id == config.next_batch_id()?,
        MarketError::BatchOutOfSequence
    );

    *batch = Batch {
        id: batch_id,
        status: BatchStatus::Open,
        opened_at: now,
        bump,
        ..Default::default()
    };
    config.batch_count = batch_id;

    Ok(BatchOpened {
        batch_id,
        opened_by: *actor,
        opened_at: now,
    })
}

pub fn close_batch(
    config: &MarketConfig,
    actor: &Pubkey,
    assignment: Option<&RoleAssignment>,
    batch: &mut Batch,
    now: i64,
) -> Result<BatchClosed> {
    require_provider(config, actor, assignment)?;
    require_not_paused(config)?;
    require!(batch.is_open(), MarketError::BatchAlreadyClosed);

    batch.status = BatchStatus::Closed;
    batch.closed_at = Some(now);

    Ok(BatchClosed {
        batch_id: batch.id,
        closed_by: *actor,
        total_staked: batch.total_staked,
        submission_count: batch.submission_count,
    })
}

/// Posts the encrypted actual score of a batch. Can be replaced until the
/// batch is finalized; a replacement after a decryption request makes that
/// request's callback fail its commitment check.
pub fn record_batch_result(
    config: &MarketConfig,
    actor: &Pubkey,
    assignment: Option<&RoleAssignment>,
    batch: &mut Batch,
    result: EncryptedScore,
) -> Result<BatchResultRecorded> {
    require_provider(config, actor, assignment)?;
    require_not_paused(config)?;
    require!(!batch.is_finalized(), MarketError::BatchAlreadyFinalized);
    require!(result.is_initialized(), MarketError::UninitializedCiphertext);

    batch.result = Some(result);

    Ok(BatchResultRecorded {
        batch_id: batch.id,
        result_handle: result.handle(),
        recorded_by: *actor,
    })
}

pub fn submit_prediction(
    config: &MarketConfig,
    cooldowns: &mut ActorCooldowns,
    batch: &mut Batch,
    prediction: &mut Prediction,
    submission: Submission,
    bump: u8,
    now: i64,
) -> Result<PredictionSubmitted> {
    require_not_paused(config)?;
    cooldowns.check_and_stamp(ActionClass::Submission, now, config.cooldown_seconds)?;
    require!(batch.is_open(), MarketError::BatchClosed);
    require!(
        submission.attached_value == submission.amount,
        MarketError::ValueMismatch
    );
    require!(
        prediction.amount == 0 && prediction.predictor == Pubkey::default(),
        MarketError::DuplicatePrediction
    );
    require!(
        submission.encrypted_score.is_initialized(),
        MarketError::UninitializedCiphertext
    );
    require!(
        batch.prediction_scores.len() < MAX_PREDICTIONS_PER_BATCH,
        MarketError::BatchFull
    );

    let total_staked = batch
        .total_staked
        .checked_add(submission.amount)
        .ok_or(MarketError::ArithmeticOverflow)?;
    let index = batch.submission_count;
    let submission_count = index
        .checked_add(1)
        .ok_or(MarketError::ArithmeticOverflow)?;

    *prediction = Prediction {
        batch_id: batch.id,
        predictor: submission.predictor,
        encrypted_score: submission.encrypted_score,
        amount: submission.amount,
        index,
        submitted_at: now,
        bump,
    };
    batch.prediction_scores.push(submission.encrypted_score);
    batch.total_staked = total_staked;
    batch.submission_count = submission_count;

    Ok(PredictionSubmitted {
        batch_id: batch.id,
        predictor: submission.predictor,
        score_handle: submission.encrypted_score.handle(),
        amount: submission.amount,
        total_staked,
        submission_count,
    })
}
