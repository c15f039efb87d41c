//! Oracle proofs checked through the Ed25519 precompile.
//!
//! The relayer places an Ed25519 signature-verify instruction right before
//! the callback. The runtime has already verified that signature by the time
//! the callback executes, so this module only has to confirm that the
//! precompile checked the expected key, message and signature.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::ed25519_program;
use anchor_lang::solana_program::sysvar::instructions::{
    load_current_index_checked, load_instruction_at_checked,
};

use crate::commitment::attestation_message;
use crate::errors::MarketError;
use crate::protocol::ProofVerifier;

pub const PUBKEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;
const HEADER_LEN: usize = 2;
const OFFSETS_LEN: usize = 14;
/// Instruction index meaning "data lives in this same instruction".
const SAME_INSTRUCTION: u16 = u16::MAX;

/// One signature entry of an Ed25519 precompile instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ed25519Entry {
    pub signer: Pubkey,
    pub signature: [u8; SIGNATURE_LEN],
    pub message: Vec<u8>,
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    let bytes = data
        .get(at..at + 2)
        .ok_or_else(|| error!(MarketError::InvalidProof))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn slice(data: &[u8], offset: u16, len: usize) -> Result<&[u8]> {
    let start = offset as usize;
    data.get(start..start + len)
        .ok_or_else(|| error!(MarketError::InvalidProof))
}

/// Parses precompile instruction data holding exactly one self-contained
/// signature.
pub fn parse_ed25519_instruction(data: &[u8]) -> Result<Ed25519Entry> {
    require!(
        data.len() >= HEADER_LEN + OFFSETS_LEN && data[0] == 1,
        MarketError::InvalidProof
    );

    let o = HEADER_LEN;
    let signature_offset = read_u16(data, o)?;
    let signature_ix = read_u16(data, o + 2)?;
    let pubkey_offset = read_u16(data, o + 4)?;
    let pubkey_ix = read_u16(data, o + 6)?;
    let message_offset = read_u16(data, o + 8)?;
    let message_len = read_u16(data, o + 10)?;
    let message_ix = read_u16(data, o + 12)?;

    require!(
        signature_ix == SAME_INSTRUCTION
            && pubkey_ix == SAME_INSTRUCTION
            && message_ix == SAME_INSTRUCTION,
        MarketError::InvalidProof
    );

    let signer = Pubkey::try_from(slice(data, pubkey_offset, PUBKEY_LEN)?)
        .map_err(|_| error!(MarketError::InvalidProof))?;
    let signature: [u8; SIGNATURE_LEN] = slice(data, signature_offset, SIGNATURE_LEN)?
        .try_into()
        .map_err(|_| error!(MarketError::InvalidProof))?;
    let message = slice(data, message_offset, message_len as usize)?.to_vec();

    Ok(Ed25519Entry {
        signer,
        signature,
        message,
    })
}

/// Matches a verified precompile entry against the expected attestation.
pub fn check_attestation(
    entry: &Ed25519Entry,
    oracle_signers: &[Pubkey],
    request_id: u64,
    commitment: &[u8; 32],
    cleartexts: &[u8],
    proof: &[u8],
) -> Result<()> {
    require!(
        oracle_signers.contains(&entry.signer),
        MarketError::InvalidProof
    );
    require!(
        entry.signature.as_slice() == proof,
        MarketError::InvalidProof
    );
    let expected = attestation_message(request_id, commitment, cleartexts);
    require!(
        entry.message.as_slice() == expected.as_slice(),
        MarketError::InvalidProof
    );
    Ok(())
}

/// Verifier backed by the instructions sysvar of the running transaction.
pub struct Ed25519Attestation<'a, 'info> {
    pub instructions_sysvar: &'a AccountInfo<'info>,
    pub oracle_signers: &'a [Pubkey],
}

impl<'a, 'info> Ed25519Attestation<'a, 'info> {
    fn preceding_entry(&self) -> Result<Ed25519Entry> {
        let current = load_current_index_checked(self.instructions_sysvar)
            .map_err(|_| error!(MarketError::InvalidProof))?;
        let previous = current
            .checked_sub(1)
            .ok_or_else(|| error!(MarketError::InvalidProof))?;
        let ix = load_instruction_at_checked(previous as usize, self.instructions_sysvar)
            .map_err(|_| error!(MarketError::InvalidProof))?;
        require_keys_eq!(ix.program_id, ed25519_program::ID, MarketError::InvalidProof);
        parse_ed25519_instruction(&ix.data)
    }
}

impl<'a, 'info> ProofVerifier for Ed25519Attestation<'a, 'info> {
    fn verify(
        &self,
        request_id: u64,
        commitment: &[u8; 32],
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<()> {
        let entry = self.preceding_entry()?;
        check_attestation(
            &entry,
            self.oracle_signers,
            request_id,
            commitment,
            cleartexts,
            proof,
        )
    }
}
