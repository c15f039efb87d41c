//! Arcium MxProgram for the Encrypted Score Market
//!
//! Decrypts a closed batch: the encrypted actual score followed by every
//! encrypted prediction. Nothing is revealed before the batch is closed
//! because the program only queues this computation for closed batches.

use arcis::prelude::*;

/// Slots for predictions in one batch
pub const MAX_PREDICTIONS: usize = 32;

/// Width of one revealed score in the callback payload
pub const WORD_LEN: usize = 4;

/// Reveal the actual score and all predictions of a batch.
/// The program fills unused prediction slots with the batch result
/// ciphertext; the relayer drops them before it builds the callback payload.
#[arcis::export]
pub fn reveal_scores(
    actual: Enc<Shared, u32>,
    predictions: [Enc<Shared, u32>; MAX_PREDICTIONS],
) -> (u32, [u32; MAX_PREDICTIONS]) {
    let actual_score = actual.reveal();

    let mut revealed = [0u32; MAX_PREDICTIONS];
    for (slot, prediction) in revealed.iter_mut().zip(predictions.iter()) {
        *slot = prediction.clone().reveal();
    }

    (actual_score, revealed)
}

/// Payload layout the program decodes: one little-endian `u32` per
/// committed ciphertext, actual score first.
pub fn pack_cleartexts(actual_score: u32, predictions: &[u32], submitted: usize) -> Vec<u8> {
    let count = submitted.min(predictions.len());
    let mut payload = Vec::with_capacity((count + 1) * WORD_LEN);
    payload.extend_from_slice(&actual_score.to_le_bytes());
    for score in &predictions[..count] {
        payload.extend_from_slice(&score.to_le_bytes());
    }
    payload
}
