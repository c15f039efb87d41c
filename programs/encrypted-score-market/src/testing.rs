//! In-memory market used by the unit tests. Every operation runs against a
//! draft copy of the whole store and is committed only when it succeeds, the
//! same all-or-nothing behaviour a transaction has on chain.

use std::collections::HashMap;

use anchor_lang::error::{Error, ErrorCode, ERROR_CODE_OFFSET};
use anchor_lang::prelude::*;

use crate::access;
use crate::commitment::attestation_message;
use crate::errors::MarketError;
use crate::events::{
    BatchClosed, BatchOpened, BatchResultRecorded, DecryptionFinalized, DecryptionRequested,
    PredictionSubmitted, RoleChanged,
};
use crate::ledger::{self, Submission};
use crate::protocol::{self, DecryptionOracle, ProofVerifier};
use crate::state::{
    ActorCooldowns, Batch, DecryptionContext, EncryptedScore, MarketConfig, Prediction,
    RoleAssignment,
};
use crate::winners::WithinTolerance;

pub fn assert_market_error<T: std::fmt::Debug>(result: Result<T>, expected: MarketError) {
    match result {
        Err(Error::AnchorError(e)) => assert_eq!(
            e.error_code_number,
            expected as u32 + ERROR_CODE_OFFSET,
            "expected {:?}, got {}",
            expected,
            e.error_name
        ),
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

/// Hands out sequential request ids and remembers what it was asked for.
#[derive(Default)]
pub struct MockOracle {
    pub next_id: u64,
    pub requests: Vec<Vec<EncryptedScore>>,
}

impl DecryptionOracle for MockOracle {
    fn request_decryption(&mut self, ciphertexts: &[EncryptedScore]) -> Result<u64> {
        self.next_id += 1;
        self.requests.push(ciphertexts.to_vec());
        Ok(self.next_id)
    }
}

/// Accepts a proof only if it is the attestation digest itself.
pub struct MockVerifier;

impl MockVerifier {
    pub fn proof_for(request_id: u64, commitment: &[u8; 32], cleartexts: &[u8]) -> Vec<u8> {
        attestation_message(request_id, commitment, cleartexts).to_vec()
    }
}

impl ProofVerifier for MockVerifier {
    fn verify(
        &self,
        request_id: u64,
        commitment: &[u8; 32],
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<()> {
        require!(
            Self::proof_for(request_id, commitment, cleartexts) == proof,
            MarketError::InvalidProof
        );
        Ok(())
    }
}

pub fn cleartexts(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[derive(Clone, Default)]
pub struct Market {
    pub program_id: Pubkey,
    pub config: MarketConfig,
    pub roles: HashMap<Pubkey, RoleAssignment>,
    pub cooldowns: HashMap<Pubkey, ActorCooldowns>,
    pub batches: HashMap<u64, Batch>,
    pub predictions: HashMap<(u64, Pubkey), Prediction>,
    pub contexts: HashMap<u64, DecryptionContext>,
    /// Lamports held by each batch account on top of its rent.
    pub vaults: HashMap<u64, u64>,
    pub now: i64,
}

impl Market {
    pub fn new(owner: Pubkey, cooldown_seconds: u64, winning_tolerance: u32) -> Self {
        Self {
            program_id: Pubkey::new_unique(),
            config: MarketConfig {
                owner,
                cooldown_seconds,
                winning_tolerance,
                oracle_signers: vec![Pubkey::new_unique()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn atomically<T>(&mut self, op: impl FnOnce(&mut Market) -> Result<T>) -> Result<T> {
        let mut draft = self.clone();
        let out = op(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    fn batch_mut(&mut self, batch_id: u64) -> Result<&mut Batch> {
        self.batches
            .get_mut(&batch_id)
            .ok_or_else(|| error!(ErrorCode::AccountNotInitialized))
    }

    /// Lamports sent straight to a batch account by anyone.
    pub fn donate(&mut self, batch_id: u64, lamports: u64) {
        *self.vaults.entry(batch_id).or_default() += lamports;
    }

    pub fn set_provider(&mut self, owner: Pubkey, actor: Pubkey, granted: bool) -> Result<RoleChanged> {
        self.atomically(|m| {
            let assignment = m.roles.entry(actor).or_default();
            access::set_provider(&m.config, &owner, assignment, actor, granted)
        })
    }

    pub fn open_batch(&mut self, actor: Pubkey, batch_id: u64) -> Result<BatchOpened> {
        self.atomically(|m| {
            require!(
                !m.batches.contains_key(&batch_id),
                ErrorCode::AccountDiscriminatorAlreadySet
            );
            let mut batch = Batch::default();
            let event = ledger::open_batch(
                &mut m.config,
                &actor,
                m.roles.get(&actor),
                &mut batch,
                batch_id,
                255,
                m.now,
            )?;
            m.batches.insert(batch_id, batch);
            Ok(event)
        })
    }

    pub fn close_batch(&mut self, actor: Pubkey, batch_id: u64) -> Result<BatchClosed> {
        self.atomically(|m| {
            let (config, role, now) = (m.config.clone(), m.roles.get(&actor).cloned(), m.now);
            let batch = m.batch_mut(batch_id)?;
            ledger::close_batch(&config, &actor, role.as_ref(), batch, now)
        })
    }

    pub fn record_result(
        &mut self,
        actor: Pubkey,
        batch_id: u64,
        result: EncryptedScore,
    ) -> Result<BatchResultRecorded> {
        self.atomically(|m| {
            let (config, role) = (m.config.clone(), m.roles.get(&actor).cloned());
            let batch = m.batch_mut(batch_id)?;
            ledger::record_batch_result(&config, &actor, role.as_ref(), batch, result)
        })
    }

    /// `transferred` is what the predictor's transfer moves into the batch
    /// account; on chain that is always `amount`.
    pub fn submit(
        &mut self,
        predictor: Pubkey,
        batch_id: u64,
        encrypted_score: EncryptedScore,
        amount: u64,
        transferred: u64,
    ) -> Result<PredictionSubmitted> {
        self.atomically(|m| {
            let config = m.config.clone();
            let now = m.now;
            let vault = m.vaults.entry(batch_id).or_default();
            let before = *vault;
            *vault += transferred;
            let attached_value = *vault - before;
            let mut cooldowns = m.cooldowns.get(&predictor).cloned().unwrap_or_default();
            cooldowns.bind(predictor, 255);
            let mut prediction = m
                .predictions
                .get(&(batch_id, predictor))
                .cloned()
                .unwrap_or_default();
            let batch = m.batch_mut(batch_id)?;

            let event = ledger::submit_prediction(
                &config,
                &mut cooldowns,
                batch,
                &mut prediction,
                Submission {
                    predictor,
                    encrypted_score,
                    amount,
                    attached_value,
                },
                255,
                now,
            )?;
            m.cooldowns.insert(predictor, cooldowns);
            m.predictions.insert((batch_id, predictor), prediction);
            Ok(event)
        })
    }

    pub fn request_evaluation(
        &mut self,
        actor: Pubkey,
        batch_id: u64,
        oracle: &mut MockOracle,
    ) -> Result<DecryptionRequested> {
        self.atomically(|m| {
            let mut cooldowns = m.cooldowns.get(&actor).cloned().unwrap_or_default();
            cooldowns.bind(actor, 255);
            let (config, role, now, program_id) = (
                m.config.clone(),
                m.roles.get(&actor).cloned(),
                m.now,
                m.program_id,
            );
            let batch = m.batch_mut(batch_id)?;

            let (mut context, event) = protocol::request_evaluation(
                &config,
                role.as_ref(),
                &mut cooldowns,
                batch,
                &actor,
                &program_id,
                oracle,
                now,
            )?;
            require!(
                !m.contexts.contains_key(&context.request_id),
                ErrorCode::AccountDiscriminatorAlreadySet
            );
            context.bump = 255;
            m.contexts.insert(context.request_id, context);
            m.cooldowns.insert(actor, cooldowns);
            Ok(event)
        })
    }

    /// The relayer names the batch account itself, as it does on chain.
    pub fn on_oracle_callback(
        &mut self,
        batch_id: u64,
        request_id: u64,
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<DecryptionFinalized> {
        self.atomically(|m| {
            let policy = WithinTolerance::new(m.config.winning_tolerance);
            let (program_id, now) = (m.program_id, m.now);
            let mut batch = m.batch_mut(batch_id)?.clone();
            let context = m.contexts.get_mut(&request_id);

            let event = protocol::finalize_decryption(
                context,
                &mut batch,
                &program_id,
                request_id,
                cleartexts,
                proof,
                &MockVerifier,
                &policy,
                now,
            )?;
            m.batches.insert(batch_id, batch);
            Ok(event)
        })
    }
}

mod tests {
    use super::*;

    const COOLDOWN: u64 = 60;

    struct Fixture {
        market: Market,
        oracle: MockOracle,
        owner: Pubkey,
        provider: Pubkey,
    }

    fn score(byte: u8) -> EncryptedScore {
        EncryptedScore::new([byte; 32], byte as u128)
    }

    fn fixture() -> Fixture {
        let owner = Pubkey::new_unique();
        let provider = Pubkey::new_unique();
        let mut market = Market::new(owner, COOLDOWN, 0);
        market.set_provider(owner, provider, true).unwrap();
        Fixture {
            market,
            oracle: MockOracle::default(),
            owner,
            provider,
        }
    }

    /// Batch 1 with a single 10-lamport prediction, closed, result posted.
    fn closed_batch_with_one_stake(f: &mut Fixture) -> Pubkey {
        let alice = Pubkey::new_unique();
        f.market.open_batch(f.provider, 1).unwrap();
        f.market.submit(alice, 1, score(70), 10, 10).unwrap();
        f.market.close_batch(f.provider, 1).unwrap();
        f.market.record_result(f.provider, 1, score(77)).unwrap();
        alice
    }

    #[test]
    fn test_submit_then_duplicate() {
        let mut f = fixture();
        let alice = Pubkey::new_unique();
        f.market.open_batch(f.provider, 1).unwrap();

        let event = f.market.submit(alice, 1, score(5), 10, 10).unwrap();
        assert_eq!(event.total_staked, 10);
        assert_eq!(event.submission_count, 1);

        f.market.now += COOLDOWN as i64;
        assert_market_error(
            f.market.submit(alice, 1, score(6), 10, 10),
            MarketError::DuplicatePrediction,
        );
        let batch = &f.market.batches[&1];
        assert_eq!(batch.total_staked, 10);
        assert_eq!(batch.submission_count, 1);
    }

    #[test]
    fn test_failed_submit_leaves_cooldown_untouched() {
        let mut f = fixture();
        let alice = Pubkey::new_unique();
        f.market.open_batch(f.provider, 1).unwrap();

        assert_market_error(
            f.market.submit(alice, 1, score(5), 10, 9),
            MarketError::ValueMismatch,
        );
        assert!(f.market.cooldowns.get(&alice).is_none());
        assert!(f.market.submit(alice, 1, score(5), 10, 10).is_ok());
    }

    #[test]
    fn test_submission_cooldown_boundary() {
        let mut f = fixture();
        let alice = Pubkey::new_unique();
        f.market.open_batch(f.provider, 1).unwrap();
        f.market.open_batch(f.provider, 2).unwrap();
        f.market.open_batch(f.provider, 3).unwrap();

        f.market.submit(alice, 1, score(5), 1, 1).unwrap();
        f.market.now = 59;
        assert_market_error(
            f.market.submit(alice, 2, score(5), 1, 1),
            MarketError::CooldownActive,
        );
        f.market.now = 60;
        assert!(f.market.submit(alice, 2, score(5), 1, 1).is_ok());
    }

    #[test]
    fn test_request_on_open_batch() {
        let mut f = fixture();
        f.market.open_batch(f.provider, 1).unwrap();
        assert_market_error(
            f.market.request_evaluation(f.provider, 1, &mut f.oracle),
            MarketError::BatchNotClosed,
        );
        assert!(f.market.contexts.is_empty());
        assert!(f.oracle.requests.is_empty());
    }

    #[test]
    fn test_request_needs_provider() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        assert_market_error(
            f.market
                .request_evaluation(Pubkey::new_unique(), 1, &mut f.oracle),
            MarketError::Unauthorized,
        );
    }

    #[test]
    fn test_request_without_result() {
        let mut f = fixture();
        f.market.open_batch(f.provider, 1).unwrap();
        f.market.close_batch(f.provider, 1).unwrap();
        assert_market_error(
            f.market.request_evaluation(f.provider, 1, &mut f.oracle),
            MarketError::UninitializedCiphertext,
        );
    }

    #[test]
    fn test_forged_then_valid_callback() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);

        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();
        let request_id = requested.request_id;
        assert!(!f.market.contexts[&request_id].processed);
        assert_eq!(f.oracle.requests[0].len(), 2);

        let payload = cleartexts(&[77, 77]);
        assert_market_error(
            f.market.on_oracle_callback(1, request_id, &payload, &[0u8; 32]),
            MarketError::InvalidProof,
        );
        assert!(!f.market.contexts[&request_id].processed);
        assert!(f.market.batches[&1].outcome.is_none());

        let proof = MockVerifier::proof_for(request_id, &requested.commitment, &payload);
        let finalized = f
            .market
            .on_oracle_callback(1, request_id, &payload, &proof)
            .unwrap();
        assert_eq!(finalized.actual_score, 77);
        assert_eq!(finalized.total_staked, 10);
        assert_eq!(finalized.winner_count, 1);
        assert!(f.market.contexts[&request_id].processed);
    }

    #[test]
    fn test_callback_replay() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();
        let payload = cleartexts(&[77, 70]);
        let proof = MockVerifier::proof_for(requested.request_id, &requested.commitment, &payload);

        let first = f
            .market
            .on_oracle_callback(1, requested.request_id, &payload, &proof)
            .unwrap();
        assert_eq!(first.winner_count, 0);
        assert_market_error(
            f.market
                .on_oracle_callback(1, requested.request_id, &payload, &proof),
            MarketError::ReplayDetected,
        );
    }

    #[test]
    fn test_unknown_request() {
        let mut f = fixture();
        f.market.open_batch(f.provider, 1).unwrap();
        assert_market_error(
            f.market.on_oracle_callback(1, 42, &cleartexts(&[1]), &[]),
            MarketError::UnknownRequest,
        );
    }

    #[test]
    fn test_result_changed_after_request() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();

        f.market.record_result(f.provider, 1, score(78)).unwrap();

        let payload = cleartexts(&[77, 70]);
        let proof = MockVerifier::proof_for(requested.request_id, &requested.commitment, &payload);
        assert_market_error(
            f.market
                .on_oracle_callback(1, requested.request_id, &payload, &proof),
            MarketError::StateMismatch,
        );
    }

    #[test]
    fn test_one_request_per_batch() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        let first = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();
        assert_eq!(f.market.batches[&1].pending_request, Some(first.request_id));

        f.market.now += COOLDOWN as i64;
        assert_market_error(
            f.market.request_evaluation(f.provider, 1, &mut f.oracle),
            MarketError::EvaluationAlreadyRequested,
        );
        assert_eq!(f.market.contexts.len(), 1);
        assert_eq!(f.oracle.requests.len(), 1);

        let payload = cleartexts(&[77, 77]);
        let proof = MockVerifier::proof_for(first.request_id, &first.commitment, &payload);
        f.market
            .on_oracle_callback(1, first.request_id, &payload, &proof)
            .unwrap();

        f.market.now += COOLDOWN as i64;
        assert_market_error(
            f.market.request_evaluation(f.provider, 1, &mut f.oracle),
            MarketError::BatchAlreadyFinalized,
        );
    }

    #[test]
    fn test_callback_must_name_the_requested_batch() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);

        // Batch 2 carries the same ciphertexts, so only the id tells them apart.
        let bob = Pubkey::new_unique();
        f.market.open_batch(f.provider, 2).unwrap();
        f.market.submit(bob, 2, score(70), 10, 10).unwrap();
        f.market.close_batch(f.provider, 2).unwrap();
        f.market.record_result(f.provider, 2, score(77)).unwrap();

        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();
        let payload = cleartexts(&[77, 77]);
        let proof = MockVerifier::proof_for(requested.request_id, &requested.commitment, &payload);

        assert_market_error(
            f.market
                .on_oracle_callback(2, requested.request_id, &payload, &proof),
            MarketError::StateMismatch,
        );
        assert!(f.market.batches[&2].outcome.is_none());
        assert!(!f.market.contexts[&requested.request_id].processed);

        // Even once batch 2 has its own request pending.
        f.market.now += COOLDOWN as i64;
        f.market
            .request_evaluation(f.provider, 2, &mut f.oracle)
            .unwrap();
        assert_market_error(
            f.market
                .on_oracle_callback(2, requested.request_id, &payload, &proof),
            MarketError::StateMismatch,
        );

        assert!(f
            .market
            .on_oracle_callback(1, requested.request_id, &payload, &proof)
            .is_ok());
    }

    #[test]
    fn test_donation_does_not_fund_a_stake() {
        let mut f = fixture();
        let alice = Pubkey::new_unique();
        f.market.open_batch(f.provider, 1).unwrap();
        f.market.donate(1, 10);

        assert_market_error(
            f.market.submit(alice, 1, score(5), 10, 0),
            MarketError::ValueMismatch,
        );
        assert_eq!(f.market.batches[&1].total_staked, 0);

        f.market.submit(alice, 1, score(5), 10, 10).unwrap();
        assert_eq!(f.market.batches[&1].total_staked, 10);
        assert_eq!(f.market.vaults[&1], 20);
    }

    #[test]
    fn test_payload_length_must_match_commitment() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();
        let payload = cleartexts(&[77]);
        let proof = MockVerifier::proof_for(requested.request_id, &requested.commitment, &payload);
        assert_market_error(
            f.market
                .on_oracle_callback(1, requested.request_id, &payload, &proof),
            MarketError::DecodeError,
        );
        assert!(!f.market.contexts[&requested.request_id].processed);
    }

    #[test]
    fn test_pause_blocks_everything_but_callback() {
        let mut f = fixture();
        closed_batch_with_one_stake(&mut f);
        f.market.open_batch(f.provider, 2).unwrap();
        let requested = f
            .market
            .request_evaluation(f.provider, 1, &mut f.oracle)
            .unwrap();

        f.market.config.set_paused(&f.owner, true).unwrap();
        f.market.now += COOLDOWN as i64;

        assert_market_error(f.market.open_batch(f.provider, 3), MarketError::Paused);
        assert_market_error(f.market.close_batch(f.provider, 2), MarketError::Paused);
        assert_market_error(
            f.market
                .submit(Pubkey::new_unique(), 2, score(1), 1, 1),
            MarketError::Paused,
        );
        assert_market_error(
            f.market.request_evaluation(f.provider, 1, &mut f.oracle),
            MarketError::Paused,
        );

        let payload = cleartexts(&[77, 70]);
        let proof = MockVerifier::proof_for(requested.request_id, &requested.commitment, &payload);
        assert!(f
            .market
            .on_oracle_callback(1, requested.request_id, &payload, &proof)
            .is_ok());
    }

    #[test]
    fn test_revoked_provider_loses_access() {
        let mut f = fixture();
        f.market.set_provider(f.owner, f.provider, false).unwrap();
        assert_market_error(
            f.market.open_batch(f.provider, 1),
            MarketError::Unauthorized,
        );
        assert!(f.market.open_batch(f.owner, 1).is_ok());
    }
}
