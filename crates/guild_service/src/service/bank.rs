//! Treasury operations.
//!
//! Every balance change goes through the store as a signed delta so
//! concurrent writers on different nodes serialize correctly; no path
//! ever writes an absolute balance it read earlier.

use guild_store::StoreError;
use guild_types::{current_timestamp, LedgerDirection, Money, PlayerId};
use guild_wire::BusMessage;
use tracing::{info, warn};

use crate::error::{GuildError, GuildResult};

use super::GuildService;

/// An operator-console adjustment to a guild treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankAdminOp {
    /// Bring the balance to exactly this value.
    Set(Money),
    Add(Money),
    Subtract(Money),
}

impl GuildService {
    /// Moves money from the player's pocket into the guild treasury.
    /// Any member may deposit.
    pub async fn deposit(&self, player: PlayerId, amount: Money) -> GuildResult<Money> {
        require_positive(amount)?;
        let membership = self.require_membership(player).await?;
        let guild = membership.guild_id;

        if !self.economy.withdraw(player, amount).await {
            return Err(GuildError::InsufficientFunds { required: amount });
        }

        let balance = match self
            .store
            .run(move |s| s.update_balance(guild, amount, false))
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                self.refund(player, amount).await;
                return Err(e);
            }
        };

        self.record_and_announce(
            guild,
            &membership.player_name,
            LedgerDirection::Deposit,
            amount,
            balance,
        )
        .await;
        Ok(balance)
    }

    /// Moves money from the treasury to the caller's pocket. Staff
    /// only; the store rejects overdrafts atomically.
    pub async fn withdraw(&self, actor: PlayerId, amount: Money) -> GuildResult<Money> {
        require_positive(amount)?;
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;

        let balance = match self
            .store
            .run_raw(move |s| s.update_balance(guild, amount.negated(), false))
            .await?
        {
            Ok(balance) => balance,
            Err(StoreError::InsufficientBalance) => {
                return Err(GuildError::InsufficientFunds { required: amount })
            }
            Err(e) => return Err(e.into()),
        };

        if !self.economy.deposit(actor, amount).await {
            // Undo the debit; the treasury must not shrink when the
            // payout never lands.
            if let Err(e) = self
                .store
                .run(move |s| s.update_balance(guild, amount, true))
                .await
            {
                warn!(guild = %guild, error = %e, "withdraw rollback failed");
            }
            return Err(GuildError::Internal("payout failed".into()));
        }

        self.record_and_announce(
            guild,
            &membership.player_name,
            LedgerDirection::Withdraw,
            amount,
            balance,
        )
        .await;
        Ok(balance)
    }

    /// Operator-console treasury adjustment, keyed by guild name. A
    /// `Set` is applied as the delta from the balance read in the same
    /// call, so it cannot resurrect money a concurrent spend already
    /// took.
    pub async fn admin_manage_bank(
        &self,
        actor_label: &str,
        guild_name: &str,
        op: BankAdminOp,
    ) -> GuildResult<Money> {
        let record = self.guild_by_name(guild_name).await?;
        let guild = record.id;

        let (delta, logged) = match op {
            BankAdminOp::Set(target) => {
                if target.is_negative() {
                    return Err(GuildError::InvalidInput(
                        "a treasury cannot be set below zero".into(),
                    ));
                }
                (record.balance.delta_to(target), target)
            }
            BankAdminOp::Add(amount) => {
                require_positive(amount)?;
                (amount, amount)
            }
            BankAdminOp::Subtract(amount) => {
                require_positive(amount)?;
                (amount.negated(), amount)
            }
        };
        if delta.is_zero() {
            return Ok(record.balance);
        }
        let direction = if delta.is_negative() {
            LedgerDirection::Withdraw
        } else {
            LedgerDirection::Deposit
        };

        let balance = self
            .store
            .run(move |s| s.update_balance(guild, delta, true))
            .await?;
        let label = actor_label.to_string();
        self.store
            .run(move |s| s.append_ledger(guild, &label, direction, logged, current_timestamp()))
            .await?;

        info!(guild = %guild, actor = actor_label, %delta, "treasury adjusted by operator");
        self.notify_guild(guild, "The guild treasury was adjusted by an operator.")
            .await;
        self.publish(BusMessage::BankSync {
            guild,
            player_name: actor_label.to_string(),
            direction,
            amount: logged,
        })
        .await;
        Ok(balance)
    }

    /// Buys a configured guild-wide buff from the treasury and applies
    /// it to every member currently on this node. Other nodes apply it
    /// to their own members when the sync arrives.
    pub async fn buy_buff(&self, actor: PlayerId, buff_key: &str) -> GuildResult<String> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let buff = self
            .config
            .buffs
            .iter()
            .find(|b| b.key.eq_ignore_ascii_case(buff_key))
            .cloned()
            .ok_or_else(|| GuildError::UnknownBuff(buff_key.to_string()))?;

        let cost = buff.cost;
        match self
            .store
            .run_raw(move |s| s.update_balance(guild, cost.negated(), false))
            .await?
        {
            Ok(_) => {}
            Err(StoreError::InsufficientBalance) => {
                return Err(GuildError::InsufficientFunds { required: cost })
            }
            Err(e) => return Err(e.into()),
        }
        let buyer = membership.player_name.clone();
        self.store
            .run({
                let buyer = buyer.clone();
                move |s| {
                    s.append_ledger(
                        guild,
                        &buyer,
                        LedgerDirection::Withdraw,
                        cost,
                        current_timestamp(),
                    )
                }
            })
            .await?;

        for player in self.cache.members_of(guild) {
            if self.directory.is_online(player).await {
                self.host
                    .apply_effect(player, &buff.effect_type, buff.seconds, buff.amplifier)
                    .await;
            }
        }

        self.notify_guild(
            guild,
            &format!("{buyer} activated {} for the guild!", buff.display_name),
        )
        .await;
        self.publish(BusMessage::BuffSync {
            guild,
            effect_type: buff.effect_type.clone(),
            seconds: buff.seconds,
            amplifier: buff.amplifier,
            buyer_name: buyer,
            buff_name: buff.display_name.clone(),
        })
        .await;
        Ok(buff.display_name)
    }

    /// Ledger write plus the local and cluster announcements shared by
    /// deposits and withdrawals.
    async fn record_and_announce(
        &self,
        guild: guild_types::GuildId,
        actor_name: &str,
        direction: LedgerDirection,
        amount: Money,
        balance: Money,
    ) {
        let name = actor_name.to_string();
        let logged = self
            .store
            .run({
                let name = name.clone();
                move |s| s.append_ledger(guild, &name, direction, amount, current_timestamp())
            })
            .await;
        if let Err(e) = logged {
            warn!(guild = %guild, error = %e, "ledger append failed");
        }

        let verb = match direction {
            LedgerDirection::Deposit => "deposited",
            LedgerDirection::Withdraw => "withdrew",
        };
        self.notify_guild(
            guild,
            &format!("{name} {verb} {amount}. Treasury: {balance}."),
        )
        .await;
        self.publish(BusMessage::BankSync {
            guild,
            player_name: name,
            direction,
            amount,
        })
        .await;
    }
}

fn require_positive(amount: Money) -> GuildResult<()> {
    if amount.is_zero() || amount.is_negative() {
        return Err(GuildError::InvalidInput(
            "the amount must be greater than zero".into(),
        ));
    }
    Ok(())
}
