use starspin_types::api::WithdrawalView;
use starspin_types::{UserId, Withdrawal, WithdrawalStatus};
use uuid::Uuid;

use crate::{Engine, EngineError};

impl Engine {
    /// Pays referral earnings out to the user's wallet.
    ///
    /// The external send happens while a durable `pending` record exists; the
    /// earnings are decremented only after the send succeeded. When that
    /// decrement no longer applies the record ends in `sent_needs_manual_fix`
    /// and the balance is left untouched.
    pub async fn withdraw_referral(
        &self,
        user: UserId,
        amount: Option<u64>,
        now: u64,
    ) -> Result<WithdrawalView, EngineError> {
        self.guard
            .admit("referral_withdraw", user, "earnings")
            .await?;
        let lock = self.guard.lock_user(user).await;
        let account = self.store.user(user)?.ok_or(EngineError::UserNotFound)?;
        let amount = amount.unwrap_or(account.referral_earnings);
        let minimum = self.config.referral_min_withdraw;
        if amount < minimum || amount == 0 {
            return Err(EngineError::BelowMinimum { minimum });
        }
        if account.referral_earnings < amount {
            return Err(EngineError::InsufficientEarnings {
                needed: amount,
                available: account.referral_earnings,
            });
        }
        let address = account.wallet_address.ok_or(EngineError::NoWallet)?;

        let mut withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id: user,
            amount,
            address,
            status: WithdrawalStatus::Pending,
            transfer_ref: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_withdrawal(&withdrawal)?;

        let memo = format!("referral payout {}", withdrawal.id);
        let receipt = match self
            .collaborators
            .send(&withdrawal.address, amount, &memo)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(
                    user_id = user,
                    withdrawal_id = %withdrawal.id,
                    amount,
                    error = %err,
                    "referral transfer failed"
                );
                self.store
                    .update_withdrawal(withdrawal.id, WithdrawalStatus::Failed, None, now)?;
                return Err(EngineError::TransferFailed(err));
            }
        };

        let status = match self.ledger.debit_referral(&lock, amount) {
            Ok(true) => WithdrawalStatus::Completed,
            Ok(false) => {
                tracing::error!(
                    user_id = user,
                    withdrawal_id = %withdrawal.id,
                    amount,
                    transfer_ref = %receipt.reference,
                    "transfer sent but earnings no longer cover it"
                );
                WithdrawalStatus::SentNeedsManualFix
            }
            Err(err) => {
                tracing::error!(
                    user_id = user,
                    withdrawal_id = %withdrawal.id,
                    amount,
                    transfer_ref = %receipt.reference,
                    error = %err,
                    "transfer sent but earnings decrement failed"
                );
                WithdrawalStatus::SentNeedsManualFix
            }
        };
        if let Err(err) = self.store.update_withdrawal(
            withdrawal.id,
            status,
            Some(&receipt.reference),
            now,
        ) {
            // The transfer already happened: report it rather than an error.
            tracing::error!(
                withdrawal_id = %withdrawal.id,
                status = %status,
                error = %err,
                "withdrawal record update failed"
            );
        }
        withdrawal.status = status;
        withdrawal.transfer_ref = Some(receipt.reference);
        withdrawal.updated_at = now;
        if status == WithdrawalStatus::Completed {
            tracing::info!(
                user_id = user,
                withdrawal_id = %withdrawal.id,
                amount,
                "referral earnings withdrawn"
            );
        }

        Ok(WithdrawalView {
            status,
            balances: self.ledger.balances(user).unwrap_or_default(),
            withdrawal,
        })
    }
}
