use anchor_lang::prelude::*;

use crate::errors::MarketError;
use crate::state::{ActionClass, ActorCooldowns};

impl ActorCooldowns {
    fn last_stamp(&mut self, class: ActionClass) -> &mut Option<i64> {
        match class {
            ActionClass::Submission => &mut self.last_submission_at,
            ActionClass::DecryptionRequest => &mut self.last_decryption_request_at,
        }
    }

    /// Rejects the action while `now < last + cooldown_seconds`, otherwise
    /// stamps `now`. Exactly `cooldown_seconds` elapsed is allowed.
    pub fn check_and_stamp(
        &mut self,
        class: ActionClass,
        now: i64,
        cooldown_seconds: u64,
    ) -> Result<()> {
        let last = self.last_stamp(class);
        if let Some(previous) = *last {
            let cooldown = i64::try_from(cooldown_seconds)
                .map_err(|_| error!(MarketError::ArithmeticOverflow))?;
            let ready_at = previous
                .checked_add(cooldown)
                .ok_or(MarketError::ArithmeticOverflow)?;
            require!(now >= ready_at, MarketError::CooldownActive);
        }
        *last = Some(now);
        Ok(())
    }
}
