use anchor_lang::prelude::*;
use arcium_client::idl::arcium::cpi::{accounts::QueueComputation, queue_computation};
use arcium_client::idl::arcium::types::{ArgumentList, ArgumentRef, CallbackInstruction};
use arcium_client::pda::comp_def_offset;

use crate::protocol::DecryptionOracle;
use crate::state::{EncryptedScore, MAX_PREDICTIONS_PER_BATCH};
use crate::SIGN_SEED;

/// Computation definition name (must match the score-reveal circuit)
pub const REVEAL_SCORES_COMP: &str = "reveal_scores";

/// Encrypted inputs `reveal_scores` takes: the batch result plus one slot
/// per possible prediction.
pub const REVEAL_SCORES_ARITY: usize = MAX_PREDICTIONS_PER_BATCH + 1;

/// Arguments for `reveal_scores`. Empty prediction slots are filled with the
/// batch result ciphertext (always a valid MXE ciphertext); the relayer only
/// reports the first `ciphertexts.len()` revealed words.
pub fn build_reveal_args(ciphertexts: &[EncryptedScore]) -> ArgumentList {
    let mut args = ArgumentList {
        args: Vec::new(),
        byte_arrays: Vec::new(),
        plaintext_numbers: Vec::new(),
        values_128_bit: Vec::new(),
        accounts: Vec::new(),
    };

    let filler = ciphertexts.first().map(|s| s.ciphertext).unwrap_or_default();
    let padded = ciphertexts
        .iter()
        .map(|s| s.ciphertext)
        .chain(std::iter::repeat(filler))
        .take(REVEAL_SCORES_ARITY);

    for ciphertext in padded {
        args.args
            .push(ArgumentRef::EncryptedU32(args.byte_arrays.len() as u8));
        args.byte_arrays.push(ciphertext);
    }

    args
}

/// Accounts the Arcium program needs to queue one computation.
#[derive(Clone)]
pub struct ArciumAccounts<'info> {
    pub signer: AccountInfo<'info>,
    pub sign_seed: AccountInfo<'info>,
    pub computation_account: AccountInfo<'info>,
    pub mxe_account: AccountInfo<'info>,
    pub mempool_account: AccountInfo<'info>,
    pub executing_pool: AccountInfo<'info>,
    pub comp_def_account: AccountInfo<'info>,
    pub cluster_account: AccountInfo<'info>,
    pub pool_account: AccountInfo<'info>,
    pub clock_account: AccountInfo<'info>,
    pub system_program: AccountInfo<'info>,
    pub arcium_program: AccountInfo<'info>,
}

/// Queues the `reveal_scores` computation on the configured MXE. The request
/// id handed back is the computation offset chosen by the caller.
pub struct ArciumOracle<'info> {
    pub accounts: ArciumAccounts<'info>,
    pub sign_seed_bump: u8,
    pub computation_offset: u64,
    pub mxe_program_id: Pubkey,
}

impl<'info> DecryptionOracle for ArciumOracle<'info> {
    fn request_decryption(&mut self, ciphertexts: &[EncryptedScore]) -> Result<u64> {
        let accounts = self.accounts.clone();
        let cpi_accounts = QueueComputation {
            signer: accounts.signer,
            sign_seed: accounts.sign_seed,
            comp: accounts.computation_account,
            mxe: accounts.mxe_account,
            mempool: accounts.mempool_account,
            executing_pool: accounts.executing_pool,
            comp_def_acc: accounts.comp_def_account,
            cluster: accounts.cluster_account,
            pool_account: accounts.pool_account,
            system_program: accounts.system_program,
            clock: accounts.clock_account,
        };

        let bump = [self.sign_seed_bump];
        let signer_seeds: &[&[&[u8]]] = &[&[SIGN_SEED, &bump]];
        let cpi_ctx =
            CpiContext::new_with_signer(accounts.arcium_program, cpi_accounts, signer_seeds);

        queue_computation(
            cpi_ctx,
            self.computation_offset,
            comp_def_offset(REVEAL_SCORES_COMP),
            None,
            build_reveal_args(ciphertexts),
            self.mxe_program_id,
            Vec::<CallbackInstruction>::new(),
            0,
            0,
            0,
        )?;

        msg!(
            "queued {} on offset {} ({} ciphertexts)",
            REVEAL_SCORES_COMP,
            self.computation_offset,
            ciphertexts.len()
        );
        Ok(self.computation_offset)
    }
}
