//! # Collection State Machine
//!
//! The whole registry in one aggregate: owner, sale switch, commit-reveal
//! metadata, token ownership, the withdrawal timelock and the treasury.
//!
//! ## Lifecycle
//!
//! ```text
//!   sale:      Inactive ──startSale──► Active ──stopSale──► Inactive
//!   metadata:  Hidden ──commit*──► Committed ──reveal──► Revealed (final)
//!   withdraw:  Idle ──request──► Requested{unlock} ──execute (now ≥ unlock)──► Idle
//!                                     │
//!                                     └──cancel──► Idle
//! ```
//!
//! `requestWithdraw` is only reachable from `Revealed`.
//!
//! ## Call discipline
//!
//! Every operation takes a [`CallContext`] carrying the caller and the
//! instant the call is evaluated at. Owner-only operations check the caller
//! first, then their preconditions in a fixed order, and touch state only
//! once every check has passed. A rejected call therefore leaves the
//! aggregate exactly as it was.
//!
//! `Collection` itself is not synchronised. Wrap it in a
//! [`Registry`](crate::registry::Registry) to get atomic calls from many
//! threads.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use veilmint_protocol::config::{CollectionConfig, ConfigError, TOKEN_URI_SUFFIX};
use veilmint_protocol::crypto::{Commitment, RevealPayload};
use veilmint_protocol::identity::Address;
use veilmint_protocol::units::{wei_string, Wei};

use crate::error::RegistryError;
use crate::events::Event;
use crate::payout::Payout;

/// Token identifiers are assigned 1, 2, 3, … in mint order.
pub type TokenId = u64;

// ---------------------------------------------------------------------------
// Call Context
// ---------------------------------------------------------------------------

/// Who is calling, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// The authenticated caller.
    pub caller: Address,
    /// The instant the whole call is evaluated at.
    pub now: DateTime<Utc>,
}

impl CallContext {
    /// Creates a call context.
    pub fn new(caller: Address, now: DateTime<Utc>) -> Self {
        Self { caller, now }
    }
}

/// The outcome of a successful operation: its return value plus the events
/// it emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    /// Operation-specific return value.
    pub value: T,
    /// Notifications for indexers, in emission order.
    pub events: Vec<Event>,
}

impl<T> Applied<T> {
    fn new(value: T, events: Vec<Event>) -> Self {
        Self { value, events }
    }
}

impl Applied<()> {
    fn event(event: Event) -> Self {
        Self::new((), vec![event])
    }

    fn quiet() -> Self {
        Self::new((), Vec::new())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Sale switch and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Whether minting is open.
    pub active: bool,
    /// Exact payment required per mint, in wei.
    #[serde(with = "wei_string")]
    pub mint_price: Wei,
    /// Hard ceiling on tokens ever minted.
    pub max_supply: u64,
}

/// Commit-reveal metadata state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealState {
    /// URI served for every token until the reveal.
    pub hidden_base_uri: String,
    /// The latest published commitment.
    pub commitment: Option<Commitment>,
    /// Set once, by a reveal that opens `commitment`.
    pub revealed: bool,
    /// The verified base URI. Empty until the reveal.
    pub base_uri: String,
}

/// Token ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Supply {
    total: u64,
    owners: BTreeMap<TokenId, Address>,
    balances: HashMap<Address, u64>,
}

/// Withdrawal timelock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WithdrawState {
    /// No withdrawal pending.
    #[default]
    Idle,
    /// A withdrawal is pending and may execute from `unlock_time` onwards.
    Requested {
        /// `request time + grace period`.
        unlock_time: DateTime<Utc>,
    },
}

impl WithdrawState {
    /// The unlock time of a pending request.
    pub fn unlock_time(&self) -> Option<DateTime<Utc>> {
        match self {
            WithdrawState::Idle => None,
            WithdrawState::Requested { unlock_time } => Some(*unlock_time),
        }
    }
}

/// A point-in-time summary of the collection, as served by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub name: String,
    pub symbol: String,
    pub owner: Address,
    pub sale_active: bool,
    pub revealed: bool,
    pub total_supply: u64,
    pub max_supply: u64,
    #[serde(with = "wei_string")]
    pub mint_price: Wei,
    #[serde(with = "wei_string")]
    pub balance: Wei,
    pub hidden_base_uri: String,
    pub commitment: Option<Commitment>,
    pub withdraw_requested: bool,
    pub withdraw_unlock_time: Option<DateTime<Utc>>,
}

/// A withdrawal whose bookkeeping has been cleared but whose value has not
/// yet left. Pass it back to [`Collection::rollback_withdraw`] if the
/// transfer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPayout {
    /// The transfer to perform.
    pub payout: Payout,
    unlock_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// The registry state aggregate.
#[derive(Debug, Clone)]
pub struct Collection {
    owner: Address,
    name: String,
    symbol: String,
    grace_period: Duration,
    sale: SaleConfig,
    reveal: RevealState,
    supply: Supply,
    withdraw: WithdrawState,
    treasury: Wei,
}

impl Collection {
    /// Deploys a collection owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation or `owner` is
    /// the zero address.
    pub fn new(owner: Address, config: &CollectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if owner.is_zero() {
            return Err(ConfigError::ZeroOwner);
        }
        Ok(Self {
            owner,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            grace_period: config.grace_period(),
            sale: SaleConfig {
                active: false,
                mint_price: config.mint_price,
                max_supply: config.max_supply,
            },
            reveal: RevealState::default(),
            supply: Supply::default(),
            withdraw: WithdrawState::Idle,
            treasury: 0,
        })
    }

    fn ensure_owner(&self, ctx: &CallContext) -> Result<(), RegistryError> {
        if ctx.caller != self.owner {
            return Err(RegistryError::NotOwner);
        }
        Ok(())
    }

    // -- Metadata -----------------------------------------------------------

    /// Replaces the placeholder URI. Allowed at any time, even after reveal.
    pub fn set_hidden_base_uri(
        &mut self,
        ctx: &CallContext,
        uri: impl Into<String>,
    ) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        let uri = uri.into();
        self.reveal.hidden_base_uri = uri.clone();
        Ok(Applied::event(Event::HiddenBaseUriSet { uri }))
    }

    /// Publishes a commitment, overwriting any earlier one.
    pub fn commit_metadata(
        &mut self,
        ctx: &CallContext,
        commitment: Commitment,
    ) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        if self.reveal.revealed {
            return Err(RegistryError::AlreadyRevealed);
        }
        self.reveal.commitment = Some(commitment);
        Ok(Applied::event(Event::MetadataCommitted { commitment }))
    }

    /// Opens the stored commitment and makes the final base URI public.
    pub fn reveal_metadata(
        &mut self,
        ctx: &CallContext,
        payload: &RevealPayload,
    ) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        let commitment = self.reveal.commitment.ok_or(RegistryError::NoCommitment)?;
        if self.reveal.revealed {
            return Err(RegistryError::AlreadyRevealed);
        }
        if !commitment.verify_payload(payload) {
            return Err(RegistryError::InvalidBaseUri);
        }
        self.reveal.base_uri = payload.base_uri.clone();
        self.reveal.revealed = true;
        Ok(Applied::event(Event::MetadataRevealed {
            base_uri: payload.base_uri.clone(),
        }))
    }

    /// The metadata URI for a minted token.
    ///
    /// Before the reveal every token shares the placeholder URI. Afterwards
    /// it is `baseURI + id + ".json"`.
    pub fn token_uri(&self, token_id: TokenId) -> Result<String, RegistryError> {
        self.owner_of(token_id)?;
        if !self.reveal.revealed {
            return Ok(self.reveal.hidden_base_uri.clone());
        }
        Ok(format!(
            "{}{}{}",
            self.reveal.base_uri, token_id, TOKEN_URI_SUFFIX
        ))
    }

    // -- Sale ---------------------------------------------------------------

    /// Opens the sale. Calling it on an open sale succeeds without effect.
    pub fn start_sale(&mut self, ctx: &CallContext) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        if self.sale.active {
            return Ok(Applied::quiet());
        }
        self.sale.active = true;
        Ok(Applied::event(Event::SaleStarted))
    }

    /// Closes the sale. Calling it on a closed sale succeeds without effect.
    pub fn stop_sale(&mut self, ctx: &CallContext) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        if !self.sale.active {
            return Ok(Applied::quiet());
        }
        self.sale.active = false;
        Ok(Applied::event(Event::SaleStopped))
    }

    /// Changes the mint price. Zero is allowed, and so is repricing mid-sale.
    pub fn set_mint_price(
        &mut self,
        ctx: &CallContext,
        price: Wei,
    ) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        self.sale.mint_price = price;
        Ok(Applied::event(Event::MintPriceSet { price }))
    }

    // -- Minting ------------------------------------------------------------

    /// Mints the next token to the caller in exchange for exactly the mint
    /// price. Open to anyone.
    pub fn mint_nft(
        &mut self,
        ctx: &CallContext,
        payment: Wei,
    ) -> Result<Applied<TokenId>, RegistryError> {
        if !self.sale.active {
            return Err(RegistryError::SaleNotActive);
        }
        if self.supply.total >= self.sale.max_supply {
            return Err(RegistryError::MaxSupplyReached {
                max: self.sale.max_supply,
            });
        }
        if payment != self.sale.mint_price {
            return Err(RegistryError::IncorrectPayment {
                expected: self.sale.mint_price,
                got: payment,
            });
        }
        let treasury = self
            .treasury
            .checked_add(payment)
            .ok_or(RegistryError::TreasuryOverflow)?;

        // total < max_supply <= u64::MAX, so this cannot overflow.
        let token_id = self.supply.total + 1;
        self.supply.total = token_id;
        self.supply.owners.insert(token_id, ctx.caller);
        *self.supply.balances.entry(ctx.caller).or_insert(0) += 1;
        self.treasury = treasury;

        Ok(Applied::new(token_id, vec![Event::mint(ctx.caller, token_id)]))
    }

    // -- Withdrawal ---------------------------------------------------------

    /// Starts the withdrawal timelock. Returns the unlock time.
    pub fn request_withdraw(
        &mut self,
        ctx: &CallContext,
    ) -> Result<Applied<DateTime<Utc>>, RegistryError> {
        self.ensure_owner(ctx)?;
        if !self.reveal.revealed {
            return Err(RegistryError::RevealRequired);
        }
        if matches!(self.withdraw, WithdrawState::Requested { .. }) {
            return Err(RegistryError::WithdrawAlreadyRequested);
        }
        let unlock_time = ctx
            .now
            .checked_add_signed(self.grace_period)
            .ok_or(RegistryError::UnlockTimeOverflow { now: ctx.now })?;
        self.withdraw = WithdrawState::Requested { unlock_time };
        Ok(Applied::new(
            unlock_time,
            vec![Event::WithdrawRequested { unlock_time }],
        ))
    }

    /// Drops the pending withdrawal request.
    pub fn cancel_withdraw(&mut self, ctx: &CallContext) -> Result<Applied<()>, RegistryError> {
        self.ensure_owner(ctx)?;
        if self.withdraw == WithdrawState::Idle {
            return Err(RegistryError::NoWithdrawRequested);
        }
        self.withdraw = WithdrawState::Idle;
        Ok(Applied::event(Event::WithdrawCancelled))
    }

    /// First half of `executeWithdraw`: checks the timelock, then zeroes the
    /// treasury and clears the request *before* any value moves.
    ///
    /// The caller performs the returned payout and, if it fails, hands the
    /// [`PendingPayout`] to [`rollback_withdraw`](Self::rollback_withdraw).
    pub fn begin_withdraw(
        &mut self,
        ctx: &CallContext,
    ) -> Result<Applied<PendingPayout>, RegistryError> {
        self.ensure_owner(ctx)?;
        let unlock_time = self
            .withdraw
            .unlock_time()
            .ok_or(RegistryError::NoWithdrawRequested)?;
        if ctx.now < unlock_time {
            return Err(RegistryError::GracePeriodNotFinished {
                unlock_time,
                now: ctx.now,
            });
        }

        let payout = Payout {
            to: self.owner,
            amount: self.treasury,
        };
        self.treasury = 0;
        self.withdraw = WithdrawState::Idle;

        Ok(Applied::new(
            PendingPayout {
                payout,
                unlock_time,
            },
            vec![Event::WithdrawExecuted {
                to: payout.to,
                amount: payout.amount,
            }],
        ))
    }

    /// Restores the treasury and the pending request after a failed payout.
    pub fn rollback_withdraw(&mut self, pending: &PendingPayout) {
        self.treasury = pending.payout.amount;
        self.withdraw = WithdrawState::Requested {
            unlock_time: pending.unlock_time,
        };
    }

    // -- Queries ------------------------------------------------------------

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn sale_active(&self) -> bool {
        self.sale.active
    }

    pub fn mint_price(&self) -> Wei {
        self.sale.mint_price
    }

    pub fn max_supply(&self) -> u64 {
        self.sale.max_supply
    }

    pub fn total_supply(&self) -> u64 {
        self.supply.total
    }

    pub fn revealed(&self) -> bool {
        self.reveal.revealed
    }

    pub fn hidden_base_uri(&self) -> &str {
        &self.reveal.hidden_base_uri
    }

    /// The verified base URI; empty until the reveal.
    pub fn base_uri(&self) -> &str {
        &self.reveal.base_uri
    }

    pub fn commitment(&self) -> Option<Commitment> {
        self.reveal.commitment
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn withdraw_requested(&self) -> bool {
        self.withdraw != WithdrawState::Idle
    }

    /// `None` when no withdrawal is pending.
    pub fn withdraw_unlock_time(&self) -> Option<DateTime<Utc>> {
        self.withdraw.unlock_time()
    }

    /// The treasury balance (`getContractBalance`).
    pub fn contract_balance(&self) -> Wei {
        self.treasury
    }

    /// Number of tokens held by `owner`; zero for unknown addresses.
    pub fn balance_of(&self, owner: &Address) -> u64 {
        self.supply.balances.get(owner).copied().unwrap_or(0)
    }

    /// The holder of `token_id`.
    pub fn owner_of(&self, token_id: TokenId) -> Result<Address, RegistryError> {
        self.supply
            .owners
            .get(&token_id)
            .copied()
            .ok_or(RegistryError::TokenNotFound(token_id))
    }

    /// Token ids held by `owner`, ascending.
    pub fn tokens_of(&self, owner: &Address) -> Vec<TokenId> {
        self.supply
            .owners
            .iter()
            .filter(|(_, holder)| *holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// A snapshot of every scalar field.
    pub fn status(&self) -> CollectionStatus {
        CollectionStatus {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            owner: self.owner,
            sale_active: self.sale.active,
            revealed: self.reveal.revealed,
            total_supply: self.supply.total,
            max_supply: self.sale.max_supply,
            mint_price: self.sale.mint_price,
            balance: self.treasury,
            hidden_base_uri: self.reveal.hidden_base_uri.clone(),
            commitment: self.reveal.commitment,
            withdraw_requested: self.withdraw_requested(),
            withdraw_unlock_time: self.withdraw.unlock_time(),
        }
    }
}
