//! Account onboarding state machine.
//!
//! ```text
//! NoKeys -> KeysGenerated -> RecoveryKeyShown -> RecoveryKeyConfirmed -> Operational
//! ```
//!
//! After signup the recovery key must be shown and explicitly confirmed
//! before the account becomes operational. Viewing the key does not count as
//! confirmation. A restored account already holds its recovery key, so it may
//! finish straight from `KeysGenerated`.

use std::fmt;

use thiserror::Error;
use tracing::info;

use tether_crypto::{export_recovery_artifact, restore_from_recovery_artifact, Keypair, RecoveryArtifact};

use crate::key_store::KeyStore;

/// Onboarding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingState {
    NoKeys,
    KeysGenerated,
    RecoveryKeyShown,
    RecoveryKeyConfirmed,
    Operational,
}

impl fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OnboardingState::NoKeys => "NO_KEYS",
            OnboardingState::KeysGenerated => "KEYS_GENERATED",
            OnboardingState::RecoveryKeyShown => "RECOVERY_KEY_SHOWN",
            OnboardingState::RecoveryKeyConfirmed => "RECOVERY_KEY_CONFIRMED",
            OnboardingState::Operational => "OPERATIONAL",
        };
        f.write_str(s)
    }
}

/// Onboarding errors.
#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("Cannot {action} from state {from}")]
    InvalidTransition {
        from: OnboardingState,
        action: &'static str,
    },

    #[error("Recovery key must be confirmed before the account becomes operational")]
    ConfirmationRequired,

    #[error(transparent)]
    Store(#[from] tether_core::Error),
}

pub type OnboardingResult<T> = std::result::Result<T, OnboardingError>;

/// Proof that the user explicitly acknowledged saving the recovery key.
#[derive(Debug)]
pub struct Acknowledgement {
    _private: (),
}

impl Acknowledgement {
    /// The user confirmed they stored the recovery key somewhere safe.
    pub fn user_confirmed() -> Self {
        Self { _private: () }
    }
}

/// Drives one account through onboarding.
#[derive(Debug)]
pub struct Onboarding {
    state: OnboardingState,
    keypair: Option<Keypair>,
    display_required: bool,
}

impl Onboarding {
    /// Fresh signup: keys must be generated and the recovery key confirmed.
    pub fn signup() -> Self {
        Self {
            state: OnboardingState::NoKeys,
            keypair: None,
            display_required: true,
        }
    }

    /// Account whose keypair came from a recovery key the user already holds.
    pub fn restored(keypair: Keypair) -> Self {
        Self {
            state: OnboardingState::KeysGenerated,
            keypair: Some(keypair),
            display_required: false,
        }
    }

    pub fn state(&self) -> OnboardingState {
        self.state
    }

    pub fn display_required(&self) -> bool {
        self.display_required
    }

    /// `NoKeys -> KeysGenerated`. Generates and persists a keypair.
    ///
    /// Refuses with `Error::KeyLoss` (via the key store) if keys are missing
    /// on an account that is reported to have encrypted data.
    pub async fn generate_keys(
        &mut self,
        keys: &KeyStore,
        prior_encrypted_data: bool,
    ) -> OnboardingResult<&Keypair> {
        self.expect(OnboardingState::NoKeys, "generate keys")?;
        let keypair = keys.ensure_keypair(prior_encrypted_data).await?.into_keypair();
        self.state = OnboardingState::KeysGenerated;
        info!(key_fingerprint = %keypair.public.fingerprint(), "Onboarding: keys ready");
        Ok(self.keypair.insert(keypair))
    }

    /// `KeysGenerated -> RecoveryKeyShown`. Returns the artifact to display.
    ///
    /// May be called again while shown (re-display).
    pub fn show_recovery_key(&mut self) -> OnboardingResult<RecoveryArtifact> {
        match self.state {
            OnboardingState::KeysGenerated | OnboardingState::RecoveryKeyShown => {}
            from => {
                return Err(OnboardingError::InvalidTransition {
                    from,
                    action: "show recovery key",
                })
            }
        }
        let keypair = self.keypair.as_ref().ok_or(OnboardingError::InvalidTransition {
            from: self.state,
            action: "show recovery key",
        })?;
        let artifact = export_recovery_artifact(keypair);
        self.state = OnboardingState::RecoveryKeyShown;
        Ok(artifact)
    }

    /// `RecoveryKeyShown -> RecoveryKeyConfirmed`.
    pub fn confirm_recovery_key(&mut self, _ack: Acknowledgement) -> OnboardingResult<()> {
        self.expect(OnboardingState::RecoveryKeyShown, "confirm recovery key")?;
        self.state = OnboardingState::RecoveryKeyConfirmed;
        Ok(())
    }

    /// Enter `Operational` and hand out the keypair.
    pub fn finish(&mut self) -> OnboardingResult<Keypair> {
        match self.state {
            OnboardingState::RecoveryKeyConfirmed => {}
            OnboardingState::KeysGenerated | OnboardingState::RecoveryKeyShown
                if !self.display_required => {}
            OnboardingState::KeysGenerated | OnboardingState::RecoveryKeyShown => {
                return Err(OnboardingError::ConfirmationRequired)
            }
            from => {
                return Err(OnboardingError::InvalidTransition {
                    from,
                    action: "finish",
                })
            }
        }
        let keypair = self.keypair.clone().ok_or(OnboardingError::InvalidTransition {
            from: self.state,
            action: "finish",
        })?;
        self.state = OnboardingState::Operational;
        Ok(keypair)
    }

    fn expect(&self, state: OnboardingState, action: &'static str) -> OnboardingResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(OnboardingError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }
}

/// Restore an account from its recovery key and persist the keypair.
///
/// Validation happens before anything is written, so a typo leaves the
/// store untouched.
pub async fn restore_account(keys: &KeyStore, artifact: &str) -> OnboardingResult<Onboarding> {
    let keypair = restore_from_recovery_artifact(artifact).map_err(tether_core::Error::from)?;
    keys.save(&keypair).await?;
    info!(key_fingerprint = %keypair.public.fingerprint(), "Account restored from recovery key");
    Ok(Onboarding::restored(keypair))
}
