use anchor_lang::prelude::*;
use anchor_lang::solana_program::keccak::hashv;

/// Upper bound on predictions a single batch can hold. Every prediction
/// ciphertext is part of the batch's decryption request.
pub const MAX_PREDICTIONS_PER_BATCH: usize = 32;

/// Upper bound on recognized oracle attestation keys.
pub const MAX_ORACLE_SIGNERS: usize = 8;

const CIPHERTEXT_DOMAIN: &[u8] = b"esm/ciphertext-v1";

// ==================== VALUE TYPES ====================

/// Arcium ciphertext of a `u32` score together with its encryption nonce.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub struct EncryptedScore {
    pub ciphertext: [u8; 32],
    pub nonce: u128,
}

impl EncryptedScore {
    pub fn new(ciphertext: [u8; 32], nonce: u128) -> Self {
        Self { ciphertext, nonce }
    }

    /// An all-zero ciphertext is the placeholder clients send before
    /// encryption ran.
    pub fn is_initialized(&self) -> bool {
        self.ciphertext != [0u8; 32]
    }

    /// Canonical 32-byte handle identifying this ciphertext.
    pub fn handle(&self) -> [u8; 32] {
        hashv(&[
            CIPHERTEXT_DOMAIN,
            &self.ciphertext,
            &self.nonce.to_le_bytes(),
        ])
        .to_bytes()
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum Role {
    #[default]
    None,
    Provider,
    Owner,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum BatchStatus {
    #[default]
    Open,
    Closed,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum ActionClass {
    Submission,
    DecryptionRequest,
}

/// Plaintext outcome written once the oracle callback finalizes a batch.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct BatchOutcome {
    pub request_id: u64,
    pub actual_score: u32,
    pub winner_count: u64,
    pub finalized_at: i64,
}

// ==================== STATE ACCOUNTS ====================

#[account]
#[derive(Default, InitSpace)]
pub struct MarketConfig {
    pub owner: Pubkey,
    pub paused: bool,
    pub cooldown_seconds: u64,
    /// Id of the most recently opened batch, 0 before the first one.
    pub batch_count: u64,
    pub winning_tolerance: u32,
    #[max_len(8)]
    pub oracle_signers: Vec<Pubkey>,
    pub mxe_program_id: Pubkey,
    pub bump: u8,
}

impl MarketConfig {
    pub fn next_batch_id(&self) -> Result<u64> {
        self.batch_count
            .checked_add(1)
            .ok_or_else(|| error!(crate::errors::MarketError::ArithmeticOverflow))
    }
}

#[account]
#[derive(Default, InitSpace)]
pub struct RoleAssignment {
    pub actor: Pubkey,
    pub role: Role,
    pub bump: u8,
}

#[account]
#[derive(Default, InitSpace)]
pub struct ActorCooldowns {
    pub actor: Pubkey,
    pub last_submission_at: Option<i64>,
    pub last_decryption_request_at: Option<i64>,
    pub bump: u8,
}

impl ActorCooldowns {
    /// Fills in identity fields the first time an `init_if_needed`
    /// account is used.
    pub fn bind(&mut self, actor: Pubkey, bump: u8) {
        if self.actor == Pubkey::default() {
            self.actor = actor;
            self.bump = bump;
        }
    }
}

#[account]
#[derive(Default, InitSpace)]
pub struct Batch {
    pub id: u64,
    pub status: BatchStatus,
    pub total_staked: u64,
    pub submission_count: u32,
    /// Encrypted actual score, posted by a provider.
    pub result: Option<EncryptedScore>,
    /// Prediction ciphertexts in submission order.
    #[max_len(32)]
    pub prediction_scores: Vec<EncryptedScore>,
    /// Request id of the one evaluation issued for this batch.
    pub pending_request: Option<u64>,
    pub outcome: Option<BatchOutcome>,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    pub bump: u8,
}

impl Batch {
    pub fn is_open(&self) -> bool {
        self.status == BatchStatus::Open
    }

    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_evaluation_requested(&self) -> bool {
        self.pending_request.is_some()
    }
}

#[account]
#[derive(Default, InitSpace)]
pub struct Prediction {
    pub batch_id: u64,
    pub predictor: Pubkey,
    pub encrypted_score: EncryptedScore,
    pub amount: u64,
    /// Position of this prediction in `Batch::prediction_scores`.
    pub index: u32,
    pub submitted_at: i64,
    pub bump: u8,
}

#[account]
#[derive(Default, InitSpace)]
pub struct DecryptionContext {
    pub request_id: u64,
    pub batch_id: u64,
    /// Commitment over the ordered ciphertext handles sent to the oracle.
    pub commitment: [u8; 32],
    pub ciphertext_count: u32,
    /// Flips false -> true once, never back.
    pub processed: bool,
    pub requested_by: Pubkey,
    pub requested_at: i64,
    pub bump: u8,
}
