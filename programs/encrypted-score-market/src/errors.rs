use anchor_lang::prelude::*;

#[error_code]
pub enum MarketError {
    // Authorization
    #[msg("Unauthorized")]
    Unauthorized,

    // Lifecycle
    #[msg("Batch is closed")]
    BatchClosed,
    #[msg("Batch is already closed")]
    BatchAlreadyClosed,
    #[msg("Batch has not been closed yet")]
    BatchNotClosed,
    #[msg("Batch id is not the next id in sequence")]
    BatchOutOfSequence,
    #[msg("Batch outcome has already been finalized")]
    BatchAlreadyFinalized,
    #[msg("Batch is full")]
    BatchFull,
    #[msg("Batch already has an evaluation request")]
    EvaluationAlreadyRequested,

    // Rate limiting
    #[msg("Cooldown window is still active")]
    CooldownActive,
    #[msg("Cooldown must be greater than zero")]
    InvalidCooldown,

    // Decryption integrity
    #[msg("Decryption request was already processed")]
    ReplayDetected,
    #[msg("Unknown decryption request")]
    UnknownRequest,
    #[msg("Committed ciphertexts no longer match the batch state")]
    StateMismatch,
    #[msg("Decryption proof is invalid")]
    InvalidProof,
    #[msg("Malformed cleartext payload")]
    DecodeError,

    // Value consistency
    #[msg("Attached value does not match the staked amount")]
    ValueMismatch,
    #[msg("Predictor already has a stake in this batch")]
    DuplicatePrediction,
    #[msg("Ciphertext is not initialized")]
    UninitializedCiphertext,
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,

    // Operational gate
    #[msg("Market is paused")]
    Paused,

    // Configuration
    #[msg("Oracle signer set must hold 1 to 8 distinct keys")]
    InvalidOracleSigners,
}
