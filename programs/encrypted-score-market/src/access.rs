//! Owner/provider guard and the owner-only administration transitions.

use anchor_lang::prelude::*;

use crate::errors::MarketError;
use crate::events::{
    CooldownUpdated, OracleSignersUpdated, OwnershipTransferred, PauseToggled, RoleChanged,
};
use crate::state::{MarketConfig, Role, RoleAssignment, MAX_ORACLE_SIGNERS};

/// Resolves the effective role of `actor`. The owner lives on the config,
/// so there is exactly one of it regardless of what assignments exist.
pub fn role_of(config: &MarketConfig, actor: &Pubkey, assignment: Option<&RoleAssignment>) -> Role {
    if config.owner == *actor {
        return Role::Owner;
    }
    match assignment {
        Some(a) if a.actor == *actor => a.role,
        _ => Role::None,
    }
}

pub fn require_owner(config: &MarketConfig, actor: &Pubkey) -> Result<()> {
    require_keys_eq!(config.owner, *actor, MarketError::Unauthorized);
    Ok(())
}

pub fn require_provider(
    config: &MarketConfig,
    actor: &Pubkey,
    assignment: Option<&RoleAssignment>,
) -> Result<()> {
    match role_of(config, actor, assignment) {
        Role::Owner | Role::Provider => Ok(()),
        Role::None => err!(MarketError::Unauthorized),
    }
}

pub fn require_not_paused(config: &MarketConfig) -> Result<()> {
    require!(!config.paused, MarketError::Paused);
    Ok(())
}

pub fn validate_oracle_signers(signers: &[Pubkey]) -> Result<()> {
    require!(
        !signers.is_empty() && signers.len() <= MAX_ORACLE_SIGNERS,
        MarketError::InvalidOracleSigners
    );
    for (i, key) in signers.iter().enumerate() {
        require!(
            !signers[i + 1..].contains(key) && *key != Pubkey::default(),
            MarketError::InvalidOracleSigners
        );
    }
    Ok(())
}

/// Sets the provider role on `assignment`. Also used to bind a freshly
/// created assignment account to its actor.
pub fn set_provider(
    config: &MarketConfig,
    owner: &Pubkey,
    assignment: &mut RoleAssignment,
    actor: Pubkey,
    granted: bool,
) -> Result<RoleChanged> {
    require_owner(config, owner)?;

    let previous_role = if assignment.actor == actor {
        assignment.role
    } else {
        Role::None
    };
    let new_role = if granted { Role::Provider } else { Role::None };

    assignment.actor = actor;
    assignment.role = new_role;

    Ok(RoleChanged {
        actor,
        previous_role,
        new_role,
        changed_by: *owner,
    })
}

impl MarketConfig {
    pub fn transfer_ownership(
        &mut self,
        actor: &Pubkey,
        new_owner: Pubkey,
    ) -> Result<OwnershipTransferred> {
        require_owner(self, actor)?;
        require!(new_owner != Pubkey::default(), MarketError::Unauthorized);

        let previous_owner = self.owner;
        self.owner = new_owner;

        Ok(OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    pub fn set_paused(&mut self, actor: &Pubkey, paused: bool) -> Result<PauseToggled> {
        require_owner(self, actor)?;
        self.paused = paused;
        Ok(PauseToggled {
            paused,
            changed_by: *actor,
        })
    }

    pub fn set_cooldown(&mut self, actor: &Pubkey, seconds: u64) -> Result<CooldownUpdated> {
        require_owner(self, actor)?;
        require!(seconds > 0, MarketError::InvalidCooldown);

        let previous_seconds = self.cooldown_seconds;
        self.cooldown_seconds = seconds;

        Ok(CooldownUpdated {
            previous_seconds,
            new_seconds: seconds,
        })
    }

    pub fn set_oracle_signers(
        &mut self,
        actor: &Pubkey,
        signers: Vec<Pubkey>,
    ) -> Result<OracleSignersUpdated> {
        require_owner(self, actor)?;
        validate_oracle_signers(&signers)?;
        self.oracle_signers = signers.clone();
        Ok(OracleSignersUpdated { signers })
    }
}
