//! Encrypted Score Market - Solana Anchor Program
//!
//! Predictors stake lamports on an encrypted score. Once a batch closes, a
//! provider asks the Arcium MXE to decrypt the batch result and every
//! prediction; the relayer's attested callback finalizes the batch exactly
//! once.

use anchor_lang::prelude::*;
use anchor_lang::system_program::{transfer, Transfer};
use arcium_client::idl::arcium::program::Arcium;

pub mod access;
pub mod attestation;
pub mod commitment;
pub mod cooldown;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod oracle;
pub mod protocol;
pub mod state;
pub mod winners;

#[cfg(test)]
mod testing;

use access::validate_oracle_signers;
use attestation::Ed25519Attestation;
use errors::MarketError;
use events::MarketInitialized;
use ledger::Submission;
use oracle::{ArciumAccounts, ArciumOracle};
use state::*;
use winners::WithinTolerance;

declare_id!("ELx279oEvRmE6yGzYqTjFgPPJkBMQtVXVtkchjBgDKBA");

// ==================== CONSTANTS ====================

/// Seeds for PDA derivation
pub const CONFIG_SEED: &[u8] = b"config";
pub const ROLE_SEED: &[u8] = b"role";
pub const COOLDOWN_SEED: &[u8] = b"cooldown";
pub const BATCH_SEED: &[u8] = b"batch";
pub const PREDICTION_SEED: &[u8] = b"prediction";
pub const DECRYPTION_SEED: &[u8] = b"decryption";
pub const SIGN_SEED: &[u8] = b"sign";

pub fn config_pda() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[CONFIG_SEED], &crate::ID)
}

pub fn batch_pda(batch_id: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[BATCH_SEED, batch_id.to_le_bytes().as_ref()], &crate::ID)
}

pub fn prediction_pda(batch_id: u64, predictor: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[PREDICTION_SEED, batch_id.to_le_bytes().as_ref(), predictor.as_ref()],
        &crate::ID,
    )
}

pub fn decryption_context_pda(request_id: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[DECRYPTION_SEED, request_id.to_le_bytes().as_ref()],
        &crate::ID,
    )
}

fn load_decryption_context(info: &AccountInfo) -> Result<Option<DecryptionContext>> {
    if info.owner != &crate::ID || info.data_is_empty() {
        return Ok(None);
    }
    let data = info.try_borrow_data()?;
    Ok(Some(DecryptionContext::try_deserialize(&mut &data[..])?))
}

fn store_decryption_context(info: &AccountInfo, context: &DecryptionContext) -> Result<()> {
    let mut data = info.try_borrow_mut_data()?;
    let mut cursor: &mut [u8] = &mut data[..];
    context.try_serialize(&mut cursor)
}

// ==================== PROGRAM ====================

#[program]
pub mod encrypted_score_market {
    use super::*;

    /// Create the market config with the signer as owner
    pub fn initialize_market(
        ctx: Context<InitializeMarket>,
        cooldown_seconds: u64,
        winning_tolerance: u32,
        oracle_signers: Vec<Pubkey>,
        mxe_program_id: Pubkey,
    ) -> Result<()> {
        // Validate parameters
        require!(cooldown_seconds > 0, MarketError::InvalidCooldown);
        validate_oracle_signers(&oracle_signers)?;

        // Initialize config
        let config = &mut ctx.accounts.config;
        config.owner = ctx.accounts.owner.key();
        config.paused = false;
        config.cooldown_seconds = cooldown_seconds;
        config.batch_count = 0;
        config.winning_tolerance = winning_tolerance;
        config.oracle_signers = oracle_signers;
        config.mxe_program_id = mxe_program_id;
        config.bump = ctx.bumps.config;

        emit!(MarketInitialized {
            owner: config.owner,
            cooldown_seconds,
            winning_tolerance,
            oracle_signer_count: config.oracle_signers.len() as u8,
        });

        Ok(())
    }

    pub fn add_provider(ctx: Context<SetProvider>, actor: Pubkey) -> Result<()> {
        let assignment = &mut ctx.accounts.role_assignment;
        assignment.bump = ctx.bumps.role_assignment;
        let event = access::set_provider(
            &ctx.accounts.config,
            &ctx.accounts.owner.key(),
            assignment,
            actor,
            true,
        )?;
        emit!(event);
        Ok(())
    }

    pub fn remove_provider(ctx: Context<SetProvider>, actor: Pubkey) -> Result<()> {
        let assignment = &mut ctx.accounts.role_assignment;
        assignment.bump = ctx.bumps.role_assignment;
        let event = access::set_provider(
            &ctx.accounts.config,
            &ctx.accounts.owner.key(),
            assignment,
            actor,
            false,
        )?;
        emit!(event);
        Ok(())
    }

    pub fn transfer_ownership(ctx: Context<OwnerOnly>, new_owner: Pubkey) -> Result<()> {
        let event = ctx
            .accounts
            .config
            .transfer_ownership(&ctx.accounts.owner.key(), new_owner)?;
        msg!("ownership transferred to {}", new_owner);
        emit!(event);
        Ok(())
    }

    pub fn set_paused(ctx: Context<OwnerOnly>, paused: bool) -> Result<()> {
        let event = ctx
            .accounts
            .config
            .set_paused(&ctx.accounts.owner.key(), paused)?;
        emit!(event);
        Ok(())
    }

    pub fn set_cooldown(ctx: Context<OwnerOnly>, seconds: u64) -> Result<()> {
        let event = ctx
            .accounts
            .config
            .set_cooldown(&ctx.accounts.owner.key(), seconds)?;
        emit!(event);
        Ok(())
    }

    pub fn set_oracle_signers(ctx: Context<OwnerOnly>, signers: Vec<Pubkey>) -> Result<()> {
        let event = ctx
            .accounts
            .config
            .set_oracle_signers(&ctx.accounts.owner.key(), signers)?;
        emit!(event);
        Ok(())
    }

    /// Open the next batch; ids run 1, 2, 3, ...
    pub fn open_batch(ctx: Context<OpenBatch>, batch_id: u64) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let event = ledger::open_batch(
            &mut ctx.accounts.config,
            &ctx.accounts.provider.key(),
            ctx.accounts.role_assignment.as_deref(),
            &mut ctx.accounts.batch,
            batch_id,
            ctx.bumps.batch,
            now,
        )?;
        emit!(event);
        Ok(())
    }

    pub fn close_batch(ctx: Context<ManageBatch>, _batch_id: u64) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let event = ledger::close_batch(
            &ctx.accounts.config,
            &ctx.accounts.provider.key(),
            ctx.accounts.role_assignment.as_deref(),
            &mut ctx.accounts.batch,
            now,
        )?;
        msg!(
            "batch {} closed with {} predictions",
            event.batch_id,
            event.submission_count
        );
        emit!(event);
        Ok(())
    }

    /// Post the encrypted actual score of a batch
    pub fn record_batch_result(
        ctx: Context<ManageBatch>,
        _batch_id: u64,
        ciphertext: [u8; 32],
        nonce: u128,
    ) -> Result<()> {
        let event = ledger::record_batch_result(
            &ctx.accounts.config,
            &ctx.accounts.provider.key(),
            ctx.accounts.role_assignment.as_deref(),
            &mut ctx.accounts.batch,
            EncryptedScore::new(ciphertext, nonce),
        )?;
        emit!(event);
        Ok(())
    }

    /// Stake on an encrypted prediction. `amount` lamports move from the
    /// predictor into the batch account, which holds every stake of the batch.
    pub fn submit_prediction(
        ctx: Context<SubmitPrediction>,
        _batch_id: u64,
        ciphertext: [u8; 32],
        nonce: u128,
        amount: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let predictor = ctx.accounts.predictor.key();

        // Move the stake into the vault and count only what this transfer added
        let vault = ctx.accounts.batch.to_account_info();
        let before = vault.lamports();
        transfer(
            CpiContext::new(
                ctx.accounts.system_program.to_account_info(),
                Transfer {
                    from: ctx.accounts.predictor.to_account_info(),
                    to: vault.clone(),
                },
            ),
            amount,
        )?;
        let attached_value = vault.lamports().saturating_sub(before);

        // Record the prediction
        let cooldowns = &mut ctx.accounts.cooldowns;
        cooldowns.bind(predictor, ctx.bumps.cooldowns);

        let event = ledger::submit_prediction(
            &ctx.accounts.config,
            cooldowns,
            &mut ctx.accounts.batch,
            &mut ctx.accounts.prediction,
            Submission {
                predictor,
                encrypted_score: EncryptedScore::new(ciphertext, nonce),
                amount,
                attached_value,
            },
            ctx.bumps.prediction,
            now,
        )?;
        emit!(event);
        Ok(())
    }

    /// Queue decryption of a closed batch. `computation_offset` becomes the
    /// request id the callback must quote.
    pub fn request_evaluation(
        ctx: Context<RequestEvaluation>,
        _batch_id: u64,
        computation_offset: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let requester = ctx.accounts.requester.key();

        // Arcium accounts for the reveal computation
        let mut oracle = ArciumOracle {
            accounts: ArciumAccounts {
                signer: ctx.accounts.requester.to_account_info(),
                sign_seed: ctx.accounts.sign_seed.to_account_info(),
                computation_account: ctx.accounts.computation_account.to_account_info(),
                mxe_account: ctx.accounts.mxe_account.to_account_info(),
                mempool_account: ctx.accounts.mempool_account.to_account_info(),
                executing_pool: ctx.accounts.executing_pool.to_account_info(),
                comp_def_account: ctx.accounts.comp_def_account.to_account_info(),
                cluster_account: ctx.accounts.cluster_account.to_account_info(),
                pool_account: ctx.accounts.pool_account.to_account_info(),
                clock_account: ctx.accounts.clock_account.to_account_info(),
                system_program: ctx.accounts.system_program.to_account_info(),
                arcium_program: ctx.accounts.arcium_program.to_account_info(),
            },
            sign_seed_bump: ctx.bumps.sign_seed,
            computation_offset,
            mxe_program_id: ctx.accounts.config.mxe_program_id,
        };

        // Validate, snapshot and queue the reveal computation
        let cooldowns = &mut ctx.accounts.cooldowns;
        cooldowns.bind(requester, ctx.bumps.cooldowns);

        let (mut context, event) = protocol::request_evaluation(
            &ctx.accounts.config,
            ctx.accounts.role_assignment.as_deref(),
            cooldowns,
            &mut ctx.accounts.batch,
            &requester,
            &crate::ID,
            &mut oracle,
            now,
        )?;

        // Store the request context
        context.bump = ctx.bumps.decryption_context;
        ctx.accounts.decryption_context.set_inner(context);

        emit!(event);
        Ok(())
    }

    /// Relayer entry point carrying the decrypted batch. Authenticity comes
    /// from the Ed25519 attestation placed right before this instruction.
    pub fn on_oracle_callback(
        ctx: Context<OnOracleCallback>,
        request_id: u64,
        cleartexts: Vec<u8>,
        proof: Vec<u8>,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        // A missing context is an unknown request, not an account error
        let context_info = ctx.accounts.decryption_context.to_account_info();
        let mut context = load_decryption_context(&context_info)?;

        // Attestation must come from a trusted oracle signer
        let instructions_sysvar = ctx.accounts.instructions_sysvar.to_account_info();
        let verifier = Ed25519Attestation {
            instructions_sysvar: &instructions_sysvar,
            oracle_signers: &ctx.accounts.config.oracle_signers,
        };
        let policy = WithinTolerance::new(ctx.accounts.config.winning_tolerance);

        let event = protocol::finalize_decryption(
            context.as_mut(),
            &mut ctx.accounts.batch,
            &crate::ID,
            request_id,
            &cleartexts,
            &proof,
            &verifier,
            &policy,
            now,
        )?;

        // Mark the request processed
        if let Some(context) = &context {
            store_decryption_context(&context_info, context)?;
        }

        msg!(
            "batch {} finalized: score {}, {} winners",
            event.batch_id,
            event.actual_score,
            event.winner_count
        );
        emit!(event);
        Ok(())
    }
}

// ==================== ACCOUNT STRUCTURES ====================

#[derive(Accounts)]
pub struct InitializeMarket<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        init,
        payer = owner,
        space = 8 + MarketConfig::INIT_SPACE,
        seeds = [CONFIG_SEED],
        bump
    )]
    pub config: Account<'info, MarketConfig>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(actor: Pubkey)]
pub struct SetProvider<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    #[account(
        init_if_needed,
        payer = owner,
        space = 8 + RoleAssignment::INIT_SPACE,
        seeds = [ROLE_SEED, actor.as_ref()],
        bump
    )]
    pub role_assignment: Account<'info, RoleAssignment>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct OwnerOnly<'info> {
    pub owner: Signer<'info>,

    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,
}

#[derive(Accounts)]
#[instruction(batch_id: u64)]
pub struct OpenBatch<'info> {
    #[account(mut)]
    pub provider: Signer<'info>,

    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    /// Absent for the owner, who needs no assignment
    #[account(seeds = [ROLE_SEED, provider.key().as_ref()], bump)]
    pub role_assignment: Option<Account<'info, RoleAssignment>>,

    #[account(
        init,
        payer = provider,
        space = 8 + Batch::INIT_SPACE,
        seeds = [BATCH_SEED, batch_id.to_le_bytes().as_ref()],
        bump
    )]
    pub batch: Account<'info, Batch>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(batch_id: u64)]
pub struct ManageBatch<'info> {
    pub provider: Signer<'info>,

    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    #[account(seeds = [ROLE_SEED, provider.key().as_ref()], bump)]
    pub role_assignment: Option<Account<'info, RoleAssignment>>,

    #[account(
        mut,
        seeds = [BATCH_SEED, batch_id.to_le_bytes().as_ref()],
        bump = batch.bump
    )]
    pub batch: Account<'info, Batch>,
}

#[derive(Accounts)]
#[instruction(batch_id: u64)]
pub struct SubmitPrediction<'info> {
    #[account(mut)]
    pub predictor: Signer<'info>,

    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    /// Also the stake vault
    #[account(
        mut,
        seeds = [BATCH_SEED, batch_id.to_le_bytes().as_ref()],
        bump = batch.bump
    )]
    pub batch: Account<'info, Batch>,

    #[account(
        init_if_needed,
        payer = predictor,
        space = 8 + Prediction::INIT_SPACE,
        seeds = [PREDICTION_SEED, batch_id.to_le_bytes().as_ref(), predictor.key().as_ref()],
        bump
    )]
    pub prediction: Account<'info, Prediction>,

    #[account(
        init_if_needed,
        payer = predictor,
        space = 8 + ActorCooldowns::INIT_SPACE,
        seeds = [COOLDOWN_SEED, predictor.key().as_ref()],
        bump
    )]
    pub cooldowns: Account<'info, ActorCooldowns>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(batch_id: u64, computation_offset: u64)]
pub struct RequestEvaluation<'info> {
    #[account(mut)]
    pub requester: Signer<'info>,

    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    #[account(seeds = [ROLE_SEED, requester.key().as_ref()], bump)]
    pub role_assignment: Option<Account<'info, RoleAssignment>>,

    #[account(
        init_if_needed,
        payer = requester,
        space = 8 + ActorCooldowns::INIT_SPACE,
        seeds = [COOLDOWN_SEED, requester.key().as_ref()],
        bump
    )]
    pub cooldowns: Account<'info, ActorCooldowns>,

    #[account(
        mut,
        seeds = [BATCH_SEED, batch_id.to_le_bytes().as_ref()],
        bump = batch.bump
    )]
    pub batch: Account<'info, Batch>,

    #[account(
        init,
        payer = requester,
        space = 8 + DecryptionContext::INIT_SPACE,
        seeds = [DECRYPTION_SEED, computation_offset.to_le_bytes().as_ref()],
        bump
    )]
    pub decryption_context: Account<'info, DecryptionContext>,

    /// CHECK: Sign PDA for Arcium CPI
    #[account(seeds = [SIGN_SEED], bump)]
    pub sign_seed: AccountInfo<'info>,

    // Arcium accounts
    pub arcium_program: Program<'info, Arcium>,
    /// CHECK: MXE account
    pub mxe_account: AccountInfo<'info>,
    /// CHECK: Cluster account
    pub cluster_account: AccountInfo<'info>,
    /// CHECK: Fee pool
    pub pool_account: AccountInfo<'info>,
    /// CHECK: Clock account
    pub clock_account: AccountInfo<'info>,
    /// CHECK: Mempool
    pub mempool_account: AccountInfo<'info>,
    /// CHECK: Executing pool
    pub executing_pool: AccountInfo<'info>,
    /// CHECK: Computation account
    #[account(mut)]
    pub computation_account: AccountInfo<'info>,
    /// CHECK: Comp def account
    pub comp_def_account: AccountInfo<'info>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(request_id: u64)]
pub struct OnOracleCallback<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, MarketConfig>,

    /// Must be the batch the request was issued for
    #[account(mut)]
    pub batch: Account<'info, Batch>,

    /// CHECK: Loaded by hand so a missing request maps to UnknownRequest
    #[account(
        mut,
        seeds = [DECRYPTION_SEED, request_id.to_le_bytes().as_ref()],
        bump
    )]
    pub decryption_context: UncheckedAccount<'info>,

    /// CHECK: Instructions sysvar
    #[account(address = anchor_lang::solana_program::sysvar::instructions::ID)]
    pub instructions_sysvar: AccountInfo<'info>,
}
