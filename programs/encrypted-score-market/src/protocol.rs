//! Request/callback protocol with the decryption oracle.
//!
//! A request snapshots the ordered ciphertexts of a closed batch into a
//! commitment and records it in a [`DecryptionContext`]. The callback is
//! accepted at most once per context, and only if the batch still derives
//! the same commitment and the oracle's proof covers the returned cleartexts.

use anchor_lang::prelude::*;

use crate::access::{require_not_paused, require_provider};
use crate::commitment::compute_commitment;
use crate::errors::MarketError;
use crate::events::{DecryptionFinalized, DecryptionRequested};
use crate::state::{
    ActionClass, ActorCooldowns, Batch, BatchOutcome, DecryptionContext, EncryptedScore,
    MarketConfig, RoleAssignment,
};
use crate::winners::WinnerPolicy;

/// Width of one decrypted score in the callback payload.
pub const CLEARTEXT_WORD_LEN: usize = 4;

/// Queues decryption of an ordered ciphertext list and returns the id the
/// eventual callback will carry.
pub trait DecryptionOracle {
    fn request_decryption(&mut self, ciphertexts: &[EncryptedScore]) -> Result<u64>;
}

/// Checks that `proof` attests `cleartexts` as the decryption of the
/// ciphertexts behind `commitment` for request `request_id`.
pub trait ProofVerifier {
    fn verify(
        &self,
        request_id: u64,
        commitment: &[u8; 32],
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<()>;
}

/// Ordered ciphertexts and their commitment for one batch.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub ciphertexts: Vec<EncryptedScore>,
    pub handles: Vec<[u8; 32]>,
    pub commitment: [u8; 32],
}

/// The batch result first, then every prediction in submission order.
pub fn evaluation_ciphertexts(batch: &Batch) -> Result<Vec<EncryptedScore>> {
    let result = batch.result.ok_or(MarketError::UninitializedCiphertext)?;
    let mut ciphertexts = Vec::with_capacity(batch.prediction_scores.len() + 1);
    ciphertexts.push(result);
    ciphertexts.extend_from_slice(&batch.prediction_scores);
    Ok(ciphertexts)
}

pub fn snapshot(batch: &Batch, program_id: &Pubkey) -> Result<Snapshot> {
    let ciphertexts = evaluation_ciphertexts(batch)?;
    let handles: Vec<[u8; 32]> = ciphertexts.iter().map(EncryptedScore::handle).collect();
    let commitment = compute_commitment(&handles, program_id);
    Ok(Snapshot {
        ciphertexts,
        handles,
        commitment,
    })
}

/// Issues the single decryption request of a closed batch and marks the
/// batch as pending on it. The returned context still needs its `bump` set
/// by the caller before it is stored.
#[allow(clippy::too_many_arguments)]
pub fn request_evaluation<O: DecryptionOracle>(
    config: &MarketConfig,
    assignment: Option<&RoleAssignment>,
    cooldowns: &mut ActorCooldowns,
    batch: &mut Batch,
    actor: &Pubkey,
    program_id: &Pubkey,
    oracle: &mut O,
    now: i64,
) -> Result<(DecryptionContext, DecryptionRequested)> {
    require_provider(config, actor, assignment)?;
    require_not_paused(config)?;
    cooldowns.check_and_stamp(ActionClass::DecryptionRequest, now, config.cooldown_seconds)?;
    require!(!batch.is_open(), MarketError::BatchNotClosed);
    require!(!batch.is_finalized(), MarketError::BatchAlreadyFinalized);
    require!(
        !batch.is_evaluation_requested(),
        MarketError::EvaluationAlreadyRequested
    );

    let Snapshot {
        ciphertexts,
        handles,
        commitment,
    } = snapshot(batch, program_id)?;
    let ciphertext_count =
        u32::try_from(ciphertexts.len()).map_err(|_| error!(MarketError::ArithmeticOverflow))?;

    let request_id = oracle.request_decryption(&ciphertexts)?;
    batch.pending_request = Some(request_id);

    let context = DecryptionContext {
        request_id,
        batch_id: batch.id,
        commitment,
        ciphertext_count,
        processed: false,
        requested_by: *actor,
        requested_at: now,
        bump: 0,
    };
    let event = DecryptionRequested {
        request_id,
        batch_id: batch.id,
        commitment,
        handles,
        requested_by: *actor,
    };
    Ok((context, event))
}

/// Splits the callback payload into one little-endian `u32` per committed
/// ciphertext.
pub fn decode_cleartexts(cleartexts: &[u8], ciphertext_count: u32) -> Result<Vec<u32>> {
    let expected_len = (ciphertext_count as usize)
        .checked_mul(CLEARTEXT_WORD_LEN)
        .ok_or(MarketError::DecodeError)?;
    require!(
        ciphertext_count > 0 && cleartexts.len() == expected_len,
        MarketError::DecodeError
    );

    cleartexts
        .chunks_exact(CLEARTEXT_WORD_LEN)
        .map(|word| {
            let bytes: [u8; CLEARTEXT_WORD_LEN] =
                word.try_into().map_err(|_| error!(MarketError::DecodeError))?;
            Ok(u32::from_le_bytes(bytes))
        })
        .collect()
}

/// Consumes the oracle callback for `request_id`. Nothing is written unless
/// every check passes.
#[allow(clippy::too_many_arguments)]
pub fn finalize_decryption<V: ProofVerifier, P: WinnerPolicy>(
    context: Option<&mut DecryptionContext>,
    batch: &mut Batch,
    program_id: &Pubkey,
    request_id: u64,
    cleartexts: &[u8],
    proof: &[u8],
    verifier: &V,
    policy: &P,
    now: i64,
) -> Result<DecryptionFinalized> {
    let context = match context {
        Some(context) if context.request_id == request_id => context,
        _ => return err!(MarketError::UnknownRequest),
    };
    require!(!context.processed, MarketError::ReplayDetected);
    require!(!batch.is_finalized(), MarketError::ReplayDetected);

    require!(
        batch.id == context.batch_id && batch.pending_request == Some(request_id),
        MarketError::StateMismatch
    );
    let current = snapshot(batch, program_id).map_err(|_| error!(MarketError::StateMismatch))?;
    require!(
        current.commitment == context.commitment,
        MarketError::StateMismatch
    );

    verifier.verify(request_id, &context.commitment, cleartexts, proof)?;

    let words = decode_cleartexts(cleartexts, context.ciphertext_count)?;
    let (actual_score, predictions) = match words.split_first() {
        Some((actual, rest)) => (*actual, rest),
        None => return err!(MarketError::DecodeError),
    };
    let winner_count = policy.count_winners(actual_score, predictions);

    context.processed = true;
    batch.outcome = Some(BatchOutcome {
        request_id,
        actual_score,
        winner_count,
        finalized_at: now,
    });

    Ok(DecryptionFinalized {
        request_id,
        batch_id: batch.id,
        actual_score,
        total_staked: batch.total_staked,
        winner_count,
    })
}
