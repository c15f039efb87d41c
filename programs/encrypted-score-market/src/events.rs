use anchor_lang::prelude::*;

use crate::state::Role;

#[event]
#[derive(Debug)]
pub struct MarketInitialized {
    pub owner: Pubkey,
    pub cooldown_seconds: u64,
    pub winning_tolerance: u32,
    pub oracle_signer_count: u8,
}

#[event]
#[derive(Debug)]
pub struct RoleChanged {
    pub actor: Pubkey,
    pub previous_role: Role,
    pub new_role: Role,
    pub changed_by: Pubkey,
}

#[event]
#[derive(Debug)]
pub struct OwnershipTransferred {
    pub previous_owner: Pubkey,
    pub new_owner: Pubkey,
}

#[event]
#[derive(Debug)]
pub struct PauseToggled {
    pub paused: bool,
    pub changed_by: Pubkey,
}

#[event]
#[derive(Debug)]
pub struct CooldownUpdated {
    pub previous_seconds: u64,
    pub new_seconds: u64,
}

#[event]
#[derive(Debug)]
pub struct OracleSignersUpdated {
    pub signers: Vec<Pubkey>,
}

#[event]
#[derive(Debug)]
pub struct BatchOpened {
    pub batch_id: u64,
    pub opened_by: Pubkey,
    pub opened_at: i64,
}

#[event]
#[derive(Debug)]
pub struct BatchClosed {
    pub batch_id: u64,
    pub closed_by: Pubkey,
    pub total_staked: u64,
    pub submission_count: u32,
}

#[event]
#[derive(Debug)]
pub struct BatchResultRecorded {
    pub batch_id: u64,
    pub result_handle: [u8; 32],
    pub recorded_by: Pubkey,
}

#[event]
#[derive(Debug)]
pub struct PredictionSubmitted {
    pub batch_id: u64,
    pub predictor: Pubkey,
    pub score_handle: [u8; 32],
    pub amount: u64,
    pub total_staked: u64,
    pub submission_count: u32,
}

#[event]
#[derive(Debug)]
pub struct DecryptionRequested {
    pub request_id: u64,
    pub batch_id: u64,
    pub commitment: [u8; 32],
    pub handles: Vec<[u8; 32]>,
    pub requested_by: Pubkey,
}

#[event]
#[derive(Debug)]
pub struct DecryptionFinalized {
    pub request_id: u64,
    pub batch_id: u64,
    pub actual_score: u32,
    pub total_staked: u64,
    pub winner_count: u64,
}
