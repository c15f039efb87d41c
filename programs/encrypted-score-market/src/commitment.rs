//! Commitments binding a decryption request to the exact ciphertexts it was
//! issued for, and the attestation digest the oracle signs.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::keccak::hashv;

const COMMITMENT_DOMAIN: &[u8] = b"esm/commitment-v1";
const ATTESTATION_DOMAIN: &[u8] = b"esm/decryption-v1";

/// Hash over the ordered ciphertext handles and the deployment identity.
/// Reordering handles or switching deployments changes the result.
pub fn compute_commitment(handles: &[[u8; 32]], program_id: &Pubkey) -> [u8; 32] {
    let count = (handles.len() as u32).to_le_bytes();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(handles.len() + 3);
    parts.push(COMMITMENT_DOMAIN);
    parts.push(program_id.as_ref());
    parts.push(&count);
    parts.extend(handles.iter().map(|h| h.as_slice()));
    hashv(&parts).to_bytes()
}

/// Message an oracle signer attests to when answering `request_id`.
pub fn attestation_message(request_id: u64, commitment: &[u8; 32], cleartexts: &[u8]) -> [u8; 32] {
    hashv(&[
        ATTESTATION_DOMAIN,
        &request_id.to_le_bytes(),
        commitment,
        cleartexts,
    ])
    .to_bytes()
}
